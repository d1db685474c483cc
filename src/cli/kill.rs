//! Terminate or cancel one backend by PID, with confirmation.

use std::io::BufRead;

use crate::config::Config;
use crate::fmt::{format_duration, truncate_query};
use crate::pg::{PgClient, Session, SessionState};

pub fn run(
    cfg: &Config,
    pid: i32,
    force: bool,
    cancel_only: bool,
) -> Result<i32, Box<dyn std::error::Error>> {
    let mut client = PgClient::new(&cfg.connection_string(), cfg.polling.timeout)?;
    let sessions = client.sessions()?;
    let target = sessions.iter().find(|s| s.pid == pid);

    let Some(target) = target else {
        return Err(format!("no connection found with PID {}", pid).into());
    };

    print_details(target);

    let action = if cancel_only { "cancel the current query on" } else { "terminate" };

    if !force {
        if target.is_idle_in_transaction() {
            println!(
                "Warning: This will {} the backend and rollback any uncommitted work.",
                action
            );
        } else if target.state == SessionState::Active {
            println!("Warning: This connection is actively running a query.");
        }
        println!();

        print!("Proceed? [y/N] ");
        use std::io::Write;
        std::io::stdout().flush()?;

        let stdin = std::io::stdin();
        let mut response = String::new();
        stdin.lock().read_line(&mut response)?;
        let response = response.trim().to_lowercase();
        if response != "y" && response != "yes" {
            println!("Canceled.");
            return Ok(0);
        }
    }

    let success = if cancel_only {
        client.cancel_backend(pid)?
    } else {
        client.terminate_backend(pid)?
    };

    if success {
        if cancel_only {
            println!("[+] Query canceled on PID {}", pid);
        } else {
            println!("[+] Backend {} terminated", pid);
        }
    } else {
        println!("[!] Backend {} may have already terminated", pid);
    }
    Ok(0)
}

fn print_details(session: &Session) {
    println!();
    println!("Connection Details");
    println!("{}", "-".repeat(44));
    println!("PID:             {}", session.pid);
    println!("Application:     {}", session.application_name);
    println!("Client:          {}", session.client_addr);
    println!("User:            {}", session.username);
    println!("State:           {}", session.state);
    println!("State duration:  {}", format_duration(session.idle_secs()));
    if session.xact_start > 0 {
        println!("Transaction:     {}", format_duration(session.xact_secs()));
    }
    println!();
    println!("Query:");
    println!("  {}", truncate_query(&session.query, 70));
    println!();
}
