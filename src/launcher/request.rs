//! Launch requests and command-line helpers

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

/// Desktop used when none is given
pub const DEFAULT_DESKTOP: &str = "Default";

/// Interactive window station
pub const WINDOW_STATION: &str = "winsta0";

/// Steps of one launch attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LaunchState {
    /// Picking the target session
    ResolveSession,
    /// Getting a primary token for that session
    AcquireToken,
    /// Creating stdio pipes
    PreparePipes,
    /// `CreateProcessAsUserW`
    CreateProcess,
    /// Process running
    Done,
    /// Attempt aborted
    Failed,
}

impl fmt::Display for LaunchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LaunchState::ResolveSession => "resolve-session",
            LaunchState::AcquireToken => "acquire-token",
            LaunchState::PreparePipes => "prepare-pipes",
            LaunchState::CreateProcess => "create-process",
            LaunchState::Done => "done",
            LaunchState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Whether the child gets a console window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleMode {
    /// `CREATE_NO_WINDOW`
    NoWindow,
    /// `CREATE_NEW_CONSOLE`
    NewConsole,
}

impl ConsoleMode {
    /// Mode for a hidden or visible window
    pub fn from_hidden(hidden_window: bool) -> Self {
        if hidden_window {
            ConsoleMode::NoWindow
        } else {
            ConsoleMode::NewConsole
        }
    }
}

/// What to launch and where
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    executable: PathBuf,
    arguments: Vec<String>,
    target_session: Option<u32>,
    desktop_name: String,
    hidden_window: bool,
    redirect_streams: bool,
    working_directory: Option<PathBuf>,
}

impl LaunchRequest {
    /// Launch `executable` in the console session on the `Default` desktop,
    /// hidden, with redirected stdio
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            arguments: Vec::new(),
            target_session: None,
            desktop_name: DEFAULT_DESKTOP.to_string(),
            hidden_window: true,
            redirect_streams: true,
            working_directory: None,
        }
    }

    /// Append one argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.arguments.push(arg.into());
        self
    }

    /// Append arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.arguments.extend(args.into_iter().map(Into::into));
        self
    }

    /// Target a specific session instead of the console
    pub fn session(mut self, session_id: Option<u32>) -> Self {
        self.target_session = session_id;
        self
    }

    /// Desktop inside `winsta0` (`Default`, `Winlogon`, ...)
    pub fn desktop(mut self, name: impl Into<String>) -> Self {
        self.desktop_name = name.into();
        self
    }

    /// Hide or show the console window
    pub fn hidden_window(mut self, hidden: bool) -> Self {
        self.hidden_window = hidden;
        self
    }

    /// Redirect stdin/stdout/stderr through pipes
    pub fn redirect_streams(mut self, redirect: bool) -> Self {
        self.redirect_streams = redirect;
        self
    }

    /// Start the child in `dir`
    pub fn working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    /// Executable path
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Arguments
    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }

    /// Requested session, `None` for the console
    pub fn target_session(&self) -> Option<u32> {
        self.target_session
    }

    /// Desktop name
    pub fn desktop_name(&self) -> &str {
        &self.desktop_name
    }

    /// Whether the window is hidden
    pub fn is_hidden(&self) -> bool {
        self.hidden_window
    }

    /// Whether stdio is redirected
    pub fn redirects_streams(&self) -> bool {
        self.redirect_streams
    }

    /// Working directory, if set
    pub fn working_dir(&self) -> Option<&Path> {
        self.working_directory.as_deref()
    }

    /// Full command line passed to process creation
    pub fn command_line(&self) -> String {
        build_command_line(&self.executable.to_string_lossy(), &self.arguments)
    }

    /// `winsta0\<desktop>`
    pub fn desktop_path(&self) -> String {
        desktop_path(&self.desktop_name)
    }

    /// Console mode from the window flag
    pub fn console_mode(&self) -> ConsoleMode {
        ConsoleMode::from_hidden(self.hidden_window)
    }
}

/// `winsta0\<name>`, with an empty name meaning `Default`
pub fn desktop_path(name: &str) -> String {
    let name = if name.is_empty() { DEFAULT_DESKTOP } else { name };
    format!("{WINDOW_STATION}\\{name}")
}

/// Command line with the executable and each argument quoted as
/// `CommandLineToArgvW` expects
pub fn build_command_line(executable: &str, arguments: &[String]) -> String {
    let mut line = if executable.starts_with('"') && executable.ends_with('"') && executable.len() > 1 {
        executable.to_string()
    } else if executable.is_empty() || executable.contains([' ', '\t']) {
        // program names cannot contain quotes, so no escaping
        format!("\"{executable}\"")
    } else {
        executable.to_string()
    };

    for arg in arguments {
        line.push(' ');
        quote_argument(arg, &mut line);
    }
    line
}

fn quote_argument(arg: &str, out: &mut String) {
    if !arg.is_empty() && !arg.contains([' ', '\t', '\n', '\u{b}', '"']) {
        out.push_str(arg);
        return;
    }

    out.push('"');
    let mut backslashes = 0usize;
    for c in arg.chars() {
        match c {
            '\\' => backslashes += 1,
            '"' => {
                // escape the run of backslashes and the quote itself
                out.extend(std::iter::repeat('\\').take(backslashes * 2 + 1));
                out.push('"');
                backslashes = 0;
            }
            _ => {
                out.extend(std::iter::repeat('\\').take(backslashes));
                out.push(c);
                backslashes = 0;
            }
        }
    }
    // backslashes before the closing quote are doubled
    out.extend(std::iter::repeat('\\').take(backslashes * 2));
    out.push('"');
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let req = LaunchRequest::new(r"C:\Tools\agent.exe");
        assert_eq!(req.target_session(), None);
        assert_eq!(req.desktop_path(), r"winsta0\Default");
        assert_eq!(req.console_mode(), ConsoleMode::NoWindow);
        assert!(req.redirects_streams());
        assert_eq!(req.command_line(), r"C:\Tools\agent.exe");
    }

    #[test]
    fn test_builder() {
        let req = LaunchRequest::new(r"C:\Program Files\Chat\chat.exe")
            .arg("--viewer")
            .arg("Jane Doe")
            .session(Some(3))
            .desktop("Winlogon")
            .hidden_window(false)
            .redirect_streams(false)
            .working_directory(r"C:\Temp");

        assert_eq!(req.target_session(), Some(3));
        assert_eq!(req.desktop_path(), r"winsta0\Winlogon");
        assert_eq!(req.console_mode(), ConsoleMode::NewConsole);
        assert!(!req.redirects_streams());
        assert_eq!(req.working_dir(), Some(Path::new(r"C:\Temp")));
        assert_eq!(
            req.command_line(),
            r#""C:\Program Files\Chat\chat.exe" --viewer "Jane Doe""#
        );
    }

    #[test]
    fn test_empty_desktop_is_default() {
        assert_eq!(desktop_path(""), r"winsta0\Default");
    }

    #[test]
    fn test_already_quoted_executable_kept() {
        assert_eq!(build_command_line(r#""C:\a b\x.exe""#, &[]), r#""C:\a b\x.exe""#);
    }

    #[test]
    fn test_argument_quoting_rules() {
        let args: Vec<String> = vec![
            "".into(),
            r#"say "hi""#.into(),
            r"C:\dir with space\".into(),
            r"a\\b".into(),
        ];
        assert_eq!(
            build_command_line("x.exe", &args),
            r#"x.exe "" "say \"hi\"" "C:\dir with space\\" a\\b"#
        );
    }

    #[test]
    fn test_state_display() {
        assert_eq!(LaunchState::AcquireToken.to_string(), "acquire-token");
    }
}
