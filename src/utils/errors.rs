//! Operator-facing error reports
//!
//! Turns an `anyhow` chain into a boxed message with the likely cause and
//! what to try next. Categories are picked by keyword over the whole chain.

use std::fmt::Write;

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";
const BOX_TOP: &str = "╔════════════════════════════════════════════════════════════╗";
const BOX_BOTTOM: &str = "╚════════════════════════════════════════════════════════════╝";

/// One known failure category
struct Hint {
    title: &'static str,
    summary: &'static str,
    /// (cause, remedies)
    causes: &'static [(&'static str, &'static [&'static str])],
}

const PLATFORM: Hint = Hint {
    title: "Unsupported Platform",
    summary: "Desktops, sessions, capture and process launch are Windows facilities.",
    causes: &[(
        "Running on a non-Windows host",
        &[
            "Run the agent on Windows 8 / Server 2012 or newer",
            "`config` validation works on any platform",
        ],
    )],
};

const PRIVILEGE: Hint = Hint {
    title: "Insufficient Privileges",
    summary: "The agent could not open a desktop, token or process it needs.",
    causes: &[
        (
            "Not running as LocalSystem",
            &[
                "Launching into another session needs SeTcbPrivilege",
                "Test interactively with: psexec -s -i lamco-desktop-agent ...",
            ],
        ),
        (
            "Secure desktop active (UAC prompt, lock screen)",
            &["Only SYSTEM can attach to the Winlogon desktop"],
        ),
    ],
};

const SESSION: Hint = Hint {
    title: "Session Error",
    summary: "No suitable interactive session was found.",
    causes: &[
        (
            "Nobody is logged on and no console is attached",
            &["Check: lamco-desktop-agent sessions", "Check: query session"],
        ),
        (
            "The requested session ended",
            &["Omit --session to target the console session"],
        ),
    ],
};

const CAPTURE: Hint = Hint {
    title: "Screen Capture Error",
    summary: "The selected capture backend could not start.",
    causes: &[
        (
            "Desktop duplication unavailable",
            &[
                "Session 0, RDP sessions and the Basic Display Adapter do not support it",
                "Set [capture] backend = \"gdi\" or \"auto\" in the config file",
            ],
        ),
        (
            "No display attached",
            &["Headless servers need a monitor or a virtual display driver"],
        ),
    ],
};

const CONFIG: Hint = Hint {
    title: "Configuration Error",
    summary: "The configuration file could not be used.",
    causes: &[
        ("Invalid TOML syntax", &["Check for typos and missing quotes"]),
        (
            "Out-of-range values",
            &["capture.quality must be 1-100", "input.workers must be at least 1"],
        ),
        (
            "Wrong file",
            &["Specify: lamco-desktop-agent --config C:\\path\\to\\agent.toml"],
        ),
    ],
};

const GENERIC: Hint = Hint {
    title: "Agent Error",
    summary: "An error occurred while running the agent.",
    causes: &[
        ("Input desktop changed", &["lamco-desktop-agent desktop"]),
        ("Session table changed", &["lamco-desktop-agent sessions"]),
    ],
};

fn classify(chain: &str) -> &'static Hint {
    let has = |needle: &str| chain.contains(needle);

    if has("unsupported") && has("windows") {
        &PLATFORM
    } else if has("access is denied") || has("privilege") || has("token") {
        &PRIVILEGE
    } else if has("session") {
        &SESSION
    } else if has("dxgi") || has("duplication") || has("no screens") {
        &CAPTURE
    } else if has("config") {
        &CONFIG
    } else {
        &GENERIC
    }
}

fn write_hint(out: &mut String, hint: &Hint) -> std::fmt::Result {
    writeln!(out, "{}", hint.title)?;
    writeln!(out)?;
    writeln!(out, "{}", hint.summary)?;
    writeln!(out)?;
    writeln!(out, "Common Causes:")?;
    for (index, (cause, remedies)) in hint.causes.iter().enumerate() {
        writeln!(out)?;
        writeln!(out, "  {}. {}", index + 1, cause)?;
        for remedy in remedies.iter() {
            writeln!(out, "     → {}", remedy)?;
        }
    }
    Ok(())
}

fn render(error: &anyhow::Error) -> Result<String, std::fmt::Error> {
    // {:#} includes every context layer
    let chain = format!("{:#}", error);
    let hint = classify(&chain.to_lowercase());

    let mut out = String::new();
    writeln!(out)?;
    writeln!(out, "{BOX_TOP}")?;
    writeln!(out, "║                     ERROR                                  ║")?;
    writeln!(out, "{BOX_BOTTOM}")?;
    writeln!(out)?;

    write_hint(&mut out, hint)?;
    if std::ptr::eq(hint, &GENERIC) {
        writeln!(out)?;
        writeln!(out, "Error: {}", chain)?;
    }

    writeln!(out)?;
    writeln!(out, "{RULE}")?;
    writeln!(out, "Technical Details:")?;
    writeln!(out)?;
    writeln!(out, "{}", chain)?;
    writeln!(out)?;
    writeln!(out, "{RULE}")?;
    writeln!(out, "Need Help?")?;
    writeln!(out, "  - Run with --verbose for detailed logs: lamco-desktop-agent -vv <command>")?;
    writeln!(out, "  - Write logs to a file: lamco-desktop-agent --log-file agent.log <command>")?;
    writeln!(out, "{BOX_BOTTOM}")?;
    Ok(out)
}

/// Render `error` with troubleshooting hints for the operator
pub fn format_user_error(error: &anyhow::Error) -> String {
    // writing into a String cannot fail
    render(error).unwrap_or_else(|_| format!("{:#}", error))
}
