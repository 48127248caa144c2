use {
    anyhow::{Result, bail},
    courier_config::{Diagnostic, Severity, validate},
};

use crate::setup::Loaded;

/// ANSI color codes.
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

pub fn check(loaded: &Loaded) -> Result<()> {
    if let Some(ref path) = loaded.path {
        eprintln!("Checking {}\n", path.display());
    } else {
        eprintln!("No config file found; checking defaults.\n");
    }

    let result = validate(&loaded.config);
    for d in &result.diagnostics {
        eprintln!("  {}", render(d));
    }

    let errors = result.count(Severity::Error);
    let warnings = result.count(Severity::Warning);

    if !result.diagnostics.is_empty() {
        eprintln!();
    }

    if errors == 0 && warnings == 0 {
        eprintln!("No issues found.");
    } else {
        eprintln!("{errors} error(s), {warnings} warning(s)");
    }

    if errors > 0 {
        bail!("configuration has {errors} error(s)");
    }
    Ok(())
}

fn render(d: &Diagnostic) -> String {
    let color = match d.severity {
        Severity::Error => RED,
        Severity::Warning => YELLOW,
    };
    format!("{BOLD}{color}{}{RESET} {}: {}", d.severity, d.path, d.message)
}

#[cfg(test)]
mod tests {
    use {super::*, courier_config::CourierConfig};

    #[test]
    fn errors_fail_the_check() {
        let loaded = Loaded {
            config: CourierConfig::default(),
            path: None,
        };
        assert!(check(&loaded).is_err());
    }

    #[test]
    fn diagnostics_name_the_offending_key() {
        let line = render(&Diagnostic {
            severity: Severity::Warning,
            path: "webhook.secret_token".to_string(),
            message: "unset".to_string(),
        });
        assert!(line.contains("warning"));
        assert!(line.ends_with("webhook.secret_token: unset"));
    }
}
