use std::path::PathBuf;

use tokio::io::{AsyncBufReadExt, BufReader};
use typesecure::prelude::*;
use typesecure::session::memory::{MemoryProvider, MemoryProviderOptions};

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq)]
enum Command {
    Register { name: String, email: String, password: String },
    Confirm { email: String },
    Login { email: String, password: String },
    Logout,
    Reset { email: String },
    Scan { text: String },
    File { path: PathBuf },
    History,
    Stats,
    Settings,
    Set(SettingsUpdate),
    WhoAmI,
    Help,
    Quit,
}

const HELP: &str = "\
commands:
  register <name> <email> <password>
  confirm <email>              follow the verification link
  login <email> <password>
  logout
  reset <email>                request a password reset link
  scan <text...>
  file <path>
  set sensitivity <0.0-1.0> | set encrypt on|off | set types <a,b,...>
  history | stats | settings | whoami | help | quit";

fn parse(line: &str) -> Result<Command, String> {
    let line = line.trim();
    let (verb, rest) = line.split_once(' ').unwrap_or((line, ""));
    let args: Vec<&str> = rest.split_whitespace().collect();
    let command = match (verb, args.as_slice()) {
        ("register", [name, email, password]) => Command::Register {
            name: name.to_string(),
            email: email.to_string(),
            password: password.to_string(),
        },
        ("confirm", [email]) => Command::Confirm {
            email: email.to_string(),
        },
        ("login", [email, password]) => Command::Login {
            email: email.to_string(),
            password: password.to_string(),
        },
        ("logout", []) => Command::Logout,
        ("reset", [email]) => Command::Reset {
            email: email.to_string(),
        },
        ("scan", [_, ..]) => Command::Scan {
            text: rest.trim().to_string(),
        },
        ("file", [path]) => Command::File {
            path: PathBuf::from(path),
        },
        ("set", ["sensitivity", value]) => match value.parse::<f64>() {
            Ok(sensitivity) => Command::Set(SettingsUpdate {
                sensitivity: Some(sensitivity),
                ..SettingsUpdate::default()
            }),
            Err(_) => return Err(format!("not a number: {value}")),
        },
        ("set", ["encrypt", flag @ ("on" | "off")]) => Command::Set(SettingsUpdate {
            auto_encrypt: Some(*flag == "on"),
            ..SettingsUpdate::default()
        }),
        ("set", ["types", list]) => Command::Set(SettingsUpdate {
            enabled_types: Some(list.split(',').map(str::to_string).collect()),
            ..SettingsUpdate::default()
        }),
        ("settings", []) => Command::Settings,
        ("history", []) => Command::History,
        ("stats", []) => Command::Stats,
        ("whoami", []) => Command::WhoAmI,
        ("help", []) => Command::Help,
        ("quit" | "exit", []) => Command::Quit,
        _ => return Err(format!("unrecognized command: {line}")),
    };
    Ok(command)
}

// ---------------------------------------------------------------------------
// Console
// ---------------------------------------------------------------------------

type App = TypeSecure<MemoryProvider, HttpDetector, MemoryRecordStore>;

/// Runs one command. Returns `false` to stop.
async fn execute(app: &App, provider: &MemoryProvider, command: Command) -> bool {
    // Failures were already shown as notices; nothing to add here.
    match command {
        Command::Register { name, email, password } => {
            if let Ok(reg) = app.sessions().register(&name, &email, &password).await {
                if reg.confirmation_required {
                    println!("registered {}; run `confirm {email}` to verify", reg.identity.email);
                } else {
                    println!("registered {}", reg.identity.email);
                }
            }
        }
        Command::Confirm { email } => match provider.confirm_email(&email) {
            Some(identity) => println!("verified {}", identity.email),
            None => println!("no account for {email}"),
        },
        Command::Login { email, password } => {
            if let Ok(identity) = app.sessions().login(&email, &password).await {
                println!("signed in as {}", identity.display_name());
            }
        }
        Command::Logout => {
            let _ = app.sessions().logout().await;
        }
        Command::Reset { email } => {
            let _ = app.sessions().request_password_reset(&email).await;
        }
        Command::Scan { text } => {
            if let Ok(record) = app.scan(DetectionRequest::Text(text)).await {
                print_record(&record);
            }
        }
        Command::File { path } => match tokio::fs::read(&path).await {
            Ok(contents) => {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string());
                if let Ok(record) = app.scan(DetectionRequest::File { name, contents }).await {
                    print_record(&record);
                }
            }
            Err(e) => println!("cannot read {}: {e}", path.display()),
        },
        Command::History => {
            if let Ok(records) = app.history(None).await {
                if records.is_empty() {
                    println!("no scans yet");
                }
                for record in &records {
                    print_record(record);
                }
            }
        }
        Command::Stats => {
            if let Ok(stats) = app.dashboard().await {
                println!(
                    "{} scans, {} sensitive",
                    stats.total_scans, stats.sensitive_detected
                );
                for (label, count) in &stats.detection_types_count {
                    println!("  {label}: {count}");
                }
            }
        }
        Command::Settings => {
            if let Ok(settings) = app.settings().await {
                print_settings(&settings);
            }
        }
        Command::Set(update) => {
            if let Ok(settings) = app.update_settings(update).await {
                print_settings(&settings);
            }
        }
        Command::WhoAmI => {
            let session = app.sessions().session();
            match session.identity() {
                Some(identity) => println!(
                    "{} <{}> verified={}",
                    identity.display_name(),
                    identity.email,
                    identity.is_verified()
                ),
                None => println!("{}", session.state()),
            }
        }
        Command::Help => println!("{HELP}"),
        Command::Quit => return false,
    }
    true
}

fn print_record(record: &DetectionRecord) {
    let verdict = if record.is_sensitive { "SENSITIVE" } else { "clean" };
    println!(
        "[{verdict}] confidence {:.2} types {:?}: {}",
        record.confidence, record.detected_types, record.processed_text
    );
}

fn print_settings(settings: &DetectionSettings) {
    println!(
        "sensitivity {:.2}, auto-encrypt {}, types {}",
        settings.sensitivity,
        if settings.auto_encrypt { "on" } else { "off" },
        settings.enabled_types.join(",")
    );
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    typesecure::init_tracing();

    let config = match std::env::args().nth(1) {
        Some(path) => AppConfig::from_json(&std::fs::read_to_string(path)?)?,
        None => AppConfig::default(),
    };
    tracing::info!(detector = %config.detector.endpoint(), "starting scan console");

    let provider = MemoryProvider::new(MemoryProviderOptions {
        require_confirmation: true,
        ..MemoryProviderOptions::default()
    })
    .with_account("Demo", "demo@typesecure.local", "demo-pass", true);

    let app = TypeSecureBuilder::new()
        .config(config)
        .build_http(provider.clone(), MemoryRecordStore::new())?;
    app.start().await?;

    println!("TypeSecure console. Demo account: demo@typesecure.local / demo-pass");
    println!("{HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match parse(&line) {
            Ok(command) => {
                if !execute(&app, &provider, command).await {
                    break;
                }
            }
            Err(e) => println!("{e} (try `help`)"),
        }
    }

    app.shutdown();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_login() {
        assert_eq!(
            parse("login ada@example.com hunter22"),
            Ok(Command::Login {
                email: "ada@example.com".into(),
                password: "hunter22".into(),
            })
        );
    }

    #[test]
    fn test_parse_scan_keeps_spacing_of_text() {
        assert_eq!(
            parse("scan call me  at 555-0100"),
            Ok(Command::Scan {
                text: "call me  at 555-0100".into(),
            })
        );
    }

    #[test]
    fn test_parse_scan_without_text_is_rejected() {
        assert!(parse("scan").is_err());
    }

    #[test]
    fn test_parse_wrong_arity_is_rejected() {
        assert!(parse("login ada@example.com").is_err());
        assert!(parse("logout now").is_err());
    }

    #[test]
    fn test_parse_set_encrypt() {
        assert_eq!(
            parse("set encrypt on"),
            Ok(Command::Set(SettingsUpdate {
                auto_encrypt: Some(true),
                ..SettingsUpdate::default()
            }))
        );
        assert!(parse("set encrypt maybe").is_err());
    }

    #[test]
    fn test_parse_set_sensitivity_needs_a_number() {
        assert!(parse("set sensitivity high").is_err());
        assert!(matches!(
            parse("set sensitivity 0.7"),
            Ok(Command::Set(SettingsUpdate { sensitivity: Some(_), .. }))
        ));
    }

    #[test]
    fn test_parse_exit_is_quit() {
        assert_eq!(parse("exit"), Ok(Command::Quit));
    }
}
