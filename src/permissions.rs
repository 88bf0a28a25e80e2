use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard};

/// Setting this to `true` skips every consent prompt.
pub const BYPASS_CONSENT_ENV: &str = "BYPASS_TOOL_CONSENT";

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PermissionMode {
    /// Ask for permission every time
    Ask,
    /// Allow all operations without prompting
    AllowAll,
    /// Refuse every remaining operation without prompting
    DenyAll,
}

impl PermissionMode {
    pub fn resolve(allow_all_flag: bool) -> Self {
        let bypass = std::env::var(BYPASS_CONSENT_ENV)
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        if allow_all_flag || bypass {
            PermissionMode::AllowAll
        } else {
            PermissionMode::Ask
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Answer {
    Yes,
    No,
    All,
    Quit,
}

fn parse_answer(input: &str) -> Option<Answer> {
    match input.trim().to_lowercase().as_str() {
        "y" | "yes" => Some(Answer::Yes),
        "n" | "no" => Some(Answer::No),
        "a" | "all" => Some(Answer::All),
        "q" | "quit" => Some(Answer::Quit),
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub struct PermissionManager {
    mode: Arc<Mutex<PermissionMode>>,
}

impl PermissionManager {
    pub fn new(mode: PermissionMode) -> Self {
        Self {
            mode: Arc::new(Mutex::new(mode)),
        }
    }

    fn mode(&self) -> MutexGuard<'_, PermissionMode> {
        self.mode.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Request permission for a file write operation
    pub fn request_file_write(&self, path: &str, content_preview: &str) -> bool {
        let current_mode = *self.mode();

        match current_mode {
            PermissionMode::AllowAll => true,
            PermissionMode::DenyAll => false,
            PermissionMode::Ask => self.prompt_user_file_write(path, content_preview),
        }
    }

    /// Request permission for a shell command execution
    pub fn request_shell_execution(&self, command: &str) -> bool {
        let current_mode = *self.mode();

        match current_mode {
            PermissionMode::AllowAll => true,
            PermissionMode::DenyAll => false,
            PermissionMode::Ask => self.prompt_user_shell_execution(command),
        }
    }

    fn prompt_user_file_write(&self, path: &str, content_preview: &str) -> bool {
        eprintln!("\n┌─────────────────────────────────────────────────────────────┐");
        eprintln!("│ FILE WRITE PERMISSION REQUESTED                            │");
        eprintln!("└─────────────────────────────────────────────────────────────┘");
        eprintln!("  Path: {}", path);
        eprintln!("\n  Content preview (first 200 chars):");
        eprintln!("  ┌─────────────────────────────────────────────────────────┐");

        let mut preview: String = content_preview.chars().take(200).collect();
        if content_preview.chars().count() > 200 {
            preview.push_str("...");
        }

        for line in preview.lines().take(10) {
            eprintln!("  │ {:<57} │", line);
        }
        eprintln!("  └─────────────────────────────────────────────────────────┘");

        self.ask("Write")
    }

    fn prompt_user_shell_execution(&self, command: &str) -> bool {
        eprintln!("\n┌─────────────────────────────────────────────────────────────┐");
        eprintln!("│ SHELL COMMAND PERMISSION REQUESTED                         │");
        eprintln!("└─────────────────────────────────────────────────────────────┘");
        eprintln!("  Command: {}", command);

        self.ask("Execution")
    }

    fn ask(&self, action: &str) -> bool {
        eprintln!("\n  Options:");
        eprintln!("    [y] Allow");
        eprintln!("    [n] Deny");
        eprintln!("    [a] Allow ALL future operations (blanket permission)");
        eprintln!("    [q] Deny this and every further operation this session");

        loop {
            eprint!("\n  Your choice [y/n/a/q]: ");
            let _ = io::stderr().flush();

            let mut input = String::new();
            match io::stdin().read_line(&mut input) {
                // EOF: nobody is there to answer
                Ok(0) | Err(_) => return false,
                Ok(_) => {}
            }

            match parse_answer(&input) {
                Some(Answer::Yes) => {
                    eprintln!("  >> {} allowed\n", action);
                    return true;
                }
                Some(Answer::No) => {
                    eprintln!("  >> {} denied\n", action);
                    return false;
                }
                Some(Answer::All) => {
                    eprintln!("  >> WARNING: Enabling blanket permissions for this session...");
                    *self.mode() = PermissionMode::AllowAll;
                    eprintln!("  >> All future operations will be allowed\n");
                    return true;
                }
                Some(Answer::Quit) => {
                    *self.mode() = PermissionMode::DenyAll;
                    eprintln!("  >> {} denied, further operations will be refused\n", action);
                    return false;
                }
                None => {
                    eprintln!("  Invalid choice. Please enter y, n, a, or q.");
                }
            }
        }
    }

    /// Check if currently in AllowAll mode
    pub fn is_allow_all(&self) -> bool {
        matches!(*self.mode(), PermissionMode::AllowAll)
    }
}
