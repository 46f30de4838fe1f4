//! Interactive coding session.
//!
//! Read-eval-print loop over the cptd query endpoint, with a per-answer
//! codes summary the way the original interactive session printed it.

use crate::client::CptdClient;
use crate::commands::{print_analysis, print_codes_summary};
use anyhow::Result;
use owo_colors::OwoColorize;
use std::io::{self, BufRead, Write};

pub async fn run(client: &CptdClient, session: Option<String>) -> Result<()> {
    // Fail fast with a useful message when the daemon is down
    let health = client.health().await?;

    println!();
    println!("{}", "ENT CPT Code Agent - Interactive Session".bold());
    println!(
        "Model: {}  Codes loaded: {}",
        health.model, health.codes_loaded
    );
    if !health.llm_available {
        println!(
            "{}",
            "Warning: the LLM backend is unreachable; queries will fail.".yellow()
        );
    }
    println!("Type 'exit' to quit");
    println!();

    let mut session_id = session;
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        print!("{} ", "Query >".bold());
        io::stdout().flush()?;

        let input = match lines.next() {
            Some(Ok(line)) => line.trim().to_string(),
            Some(Err(e)) => {
                eprintln!("Error reading input: {}", e);
                continue;
            }
            None => break, // EOF
        };

        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
            break;
        }

        println!();
        println!("{}", "Processing...".dimmed());

        match client.query(&input, session_id.clone()).await {
            Ok(response) => {
                session_id = Some(response.session_id.clone());
                println!();
                println!("{}", response.answer);
                println!();
                print_codes_summary(client, &response.codes).await?;
                if let Some(analysis) = &response.analysis {
                    print_analysis(analysis);
                }
            }
            Err(e) => {
                eprintln!("{} {}", "Error:".red(), e);
            }
        }
    }

    if let Some(id) = session_id {
        println!("Session saved: {}", id);
    }
    Ok(())
}
