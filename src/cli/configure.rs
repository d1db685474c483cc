//! Interactive setup wizard plus `configure show` / `configure test`.

use std::io::{BufRead, Write};

use crate::alerts::{AlertChannel, SlackChannel, WebhookChannel};
use crate::config::{Config, default_path};
use crate::fmt::format_duration;
use crate::pg::PgClient;

fn prompt(label: &str) -> Result<String, Box<dyn std::error::Error>> {
    print!("{}", label);
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

/// Prompt with a default shown in brackets; empty input takes the default.
fn prompt_default(label: &str, default: &str) -> Result<String, Box<dyn std::error::Error>> {
    let answer = prompt(&format!("{} [{}]: ", label, default))?;
    Ok(if answer.is_empty() { default.to_string() } else { answer })
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.to_lowercase().as_str(), "y" | "yes")
}

fn is_no(answer: &str) -> bool {
    matches!(answer.to_lowercase().as_str(), "n" | "no")
}

fn test_connection(cfg: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let mut client = PgClient::new(&cfg.connection_string(), cfg.polling.timeout)?;
    client.try_connect()?;
    Ok(())
}

pub fn run_wizard() -> Result<i32, Box<dyn std::error::Error>> {
    println!();
    println!("pgsentry Configuration");
    println!("{}", "=".repeat(44));
    println!();

    let mut cfg = Config::default();

    println!("Database Connection");
    println!("{}", "-".repeat(44));
    println!();

    cfg.connection.host = prompt_default("Database host", "localhost")?;
    cfg.connection.port = prompt_default("Database port", "5432")?
        .parse()
        .map_err(|_| "invalid port")?;

    cfg.connection.database = prompt("Database name: ")?;
    if cfg.connection.database.is_empty() {
        return Err("database name is required".into());
    }
    cfg.connection.user = prompt("Database user: ")?;
    if cfg.connection.user.is_empty() {
        return Err("database user is required".into());
    }

    println!();
    println!("Authentication method:");
    println!("  1. Password (direct)");
    println!("  2. Password from environment variable");
    println!();
    match prompt_default("Select", "1")?.as_str() {
        "1" => {
            cfg.connection.password = prompt("Database password: ")?;
        }
        "2" => {
            cfg.connection.password_env =
                prompt_default("Environment variable name", "PGPASSWORD")?;
        }
        other => return Err(format!("invalid choice: {}", other).into()),
    }

    println!();
    cfg.connection.sslmode = prompt_default("SSL mode", "prefer")?;

    println!();
    if !is_no(&prompt_default("Test connection now?", "Y/n")?) {
        print!("Testing connection... ");
        std::io::stdout().flush()?;
        match test_connection(&cfg) {
            Ok(()) => println!("[OK]"),
            Err(e) => {
                println!("[FAILED]");
                println!("Error: {}", e);
                println!();
                if !is_yes(&prompt("Save configuration anyway? [y/N]: ")?) {
                    println!("Configuration not saved.");
                    return Ok(0);
                }
            }
        }
    }

    println!();
    println!("Thresholds");
    println!("{}", "-".repeat(44));

    let warn = prompt_default("Idle transaction warning", "30s")?;
    cfg.thresholds.idle_transaction.warning =
        humantime::parse_duration(&warn).map_err(|_| format!("invalid duration: {}", warn))?;
    let crit = prompt_default("Idle transaction critical", "2m")?;
    cfg.thresholds.idle_transaction.critical =
        humantime::parse_duration(&crit).map_err(|_| format!("invalid duration: {}", crit))?;

    println!();
    if is_yes(&prompt("Configure Slack alerts? [y/N]: ")?) {
        cfg.alerts.slack.enabled = true;
        cfg.alerts.slack.webhook_url = prompt("Slack webhook URL: ")?;
        cfg.alerts.slack.channel = prompt_default("Slack channel", "#alerts")?;
    }

    cfg.validate()?;

    let path = default_path()?;
    println!();
    if is_no(&prompt_default(&format!("Save configuration to {}?", path.display()), "Y/n")?) {
        println!("Configuration not saved.");
        return Ok(0);
    }
    cfg.save(&path)?;

    println!();
    println!("[+] Configuration saved to {}", path.display());
    println!();
    println!("Next steps:");
    println!("  pgsentry status    # Check current connections");
    println!("  pgsentry watch     # Monitor in real-time");
    println!("  pgsentryd          # Run the monitoring daemon");
    println!();
    Ok(0)
}

pub fn run_show(cfg: &Config) -> Result<i32, Box<dyn std::error::Error>> {
    if let Ok(path) = default_path() {
        println!("Config file: {}", path.display());
        println!();
    }

    println!("Connection");
    println!("{}", "-".repeat(44));
    println!("  Host:      {}", cfg.connection.host);
    println!("  Port:      {}", cfg.connection.port);
    println!("  Database:  {}", cfg.connection.database);
    println!("  User:      {}", cfg.connection.user);
    println!("  SSL:       {}", cfg.connection.sslmode);

    println!();
    println!("Thresholds");
    println!("{}", "-".repeat(44));
    println!(
        "  Idle warning:   {}",
        format_duration(cfg.thresholds.idle_transaction.warning.as_secs() as i64)
    );
    println!(
        "  Idle critical:  {}",
        format_duration(cfg.thresholds.idle_transaction.critical.as_secs() as i64)
    );
    println!("  Pool warning:   {}%", cfg.thresholds.connection_pool.warning_percent);
    println!("  Pool critical:  {}%", cfg.thresholds.connection_pool.critical_percent);

    println!();
    println!("Alerts");
    println!("{}", "-".repeat(44));
    if cfg.alerts.slack.enabled {
        println!("  Slack:     enabled ({})", cfg.alerts.slack.channel);
    } else {
        println!("  Slack:     disabled");
    }
    if cfg.alerts.webhook.enabled {
        println!("  Webhook:   enabled ({})", cfg.alerts.webhook.url);
    } else {
        println!("  Webhook:   disabled");
    }

    println!();
    println!("Auto-Terminate");
    println!("{}", "-".repeat(44));
    if cfg.auto_terminate.enabled {
        println!(
            "  Enabled:   yes (after {})",
            format_duration(cfg.auto_terminate.after.as_secs() as i64)
        );
        println!("  Dry run:   {}", cfg.auto_terminate.dry_run);
    } else {
        println!("  Enabled:   no");
    }

    println!();
    Ok(0)
}

pub fn run_test(cfg: &Config) -> Result<i32, Box<dyn std::error::Error>> {
    println!("Testing configuration...");
    println!();

    if let Err(e) = cfg.validate() {
        println!("[FAILED] Configuration: {}", e);
        return Ok(1);
    }
    println!("[OK] Configuration valid");

    print!("Testing PostgreSQL connection... ");
    std::io::stdout().flush()?;
    match test_connection(cfg) {
        Ok(()) => println!("[OK]"),
        Err(e) => {
            println!("[FAILED]");
            println!("    Error: {}", e);
        }
    }

    if cfg.alerts.slack.enabled {
        print!("Testing Slack webhook... ");
        std::io::stdout().flush()?;
        let mut url = cfg.alerts.slack.webhook_url.clone();
        if url.is_empty() {
            url = std::env::var("SLACK_WEBHOOK_URL").unwrap_or_default();
        }
        if url.is_empty() {
            println!("[SKIP] No webhook URL configured");
        } else {
            match SlackChannel::new(url, cfg.alerts.slack.channel.clone(), Vec::new())
                .and_then(|c| c.test())
            {
                Ok(()) => println!("[OK]"),
                Err(e) => {
                    println!("[FAILED]");
                    println!("    Error: {}", e);
                }
            }
        }
    }

    if cfg.alerts.webhook.enabled {
        print!("Testing webhook... ");
        std::io::stdout().flush()?;
        let mut url = cfg.alerts.webhook.url.clone();
        if url.is_empty() {
            url = std::env::var("WEBHOOK_URL").unwrap_or_default();
        }
        if url.is_empty() {
            println!("[SKIP] No URL configured");
        } else {
            match WebhookChannel::new(
                url,
                cfg.alerts.webhook.method.clone(),
                cfg.alerts.webhook.headers.clone(),
            )
            .and_then(|c| c.test())
            {
                Ok(()) => println!("[OK]"),
                Err(e) => {
                    println!("[FAILED]");
                    println!("    Error: {}", e);
                }
            }
        }
    }

    println!();
    Ok(0)
}
