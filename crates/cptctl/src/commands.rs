//! One-shot command implementations.

use crate::client::CptdClient;
use anyhow::Result;
use cpt_shared::{base_code, ProcedureAnalysis};
use owo_colors::OwoColorize;

pub async fn ask(client: &CptdClient, query: &str, session: Option<String>) -> Result<()> {
    let response = client.query(query, session).await?;

    println!("{}", response.answer);
    println!();
    print_codes_summary(client, &response.codes).await?;

    if let Some(analysis) = &response.analysis {
        print_analysis(analysis);
    }

    println!("{} {}", "session:".dimmed(), response.session_id.dimmed());
    Ok(())
}

pub async fn search(client: &CptdClient, term: &str, limit: Option<usize>) -> Result<()> {
    let response = client.search(term, limit).await?;

    if response.codes.is_empty() {
        println!("No codes matched '{}'", term);
        return Ok(());
    }

    println!("{} result(s) for '{}':", response.count, term);
    println!();
    for details in &response.codes {
        print!("  {}  {}", details.code.bold(), details.description);
        if details.key_indicator {
            print!("  {}", "KEY INDICATOR".green());
        }
        println!();
        if !details.category.is_empty() {
            print!("         {}", details.category.dimmed());
            if !details.subspecialty.is_empty() {
                print!(" / {}", details.subspecialty.dimmed());
            }
            println!();
        }
        if details.standard_charge > 0.0 {
            println!("         Standard charge: ${:.2}", details.standard_charge);
        }
    }
    Ok(())
}

pub async fn code(client: &CptdClient, code: &str) -> Result<()> {
    let validation = client.validate(code).await?;
    if !validation.valid {
        println!("{} {}", "✗".red(), validation.error.unwrap_or_default());
        return Ok(());
    }

    println!(
        "{} {} is a valid CPT code",
        "✓".green(),
        validation.code.bold()
    );
    if let Some(details) = client.details(&validation.code).await? {
        println!("  {}", details.description);
        if !details.category.is_empty() {
            print!("  {}", details.category.dimmed());
            if !details.subspecialty.is_empty() {
                print!(" / {}", details.subspecialty.dimmed());
            }
            println!();
        }
        if details.key_indicator {
            println!("  {}", "✓ KEY INDICATOR".green());
        }
        if details.standard_charge > 0.0 {
            println!("  Standard charge: ${:.2}", details.standard_charge);
        }
        if !details.related_codes.is_empty() {
            println!("  Related codes: {}", details.related_codes.join(", "));
        }
    }
    Ok(())
}

pub async fn analyze(client: &CptdClient, procedure: &str, codes: Option<String>) -> Result<()> {
    let candidates = codes.map(|list| {
        list.split(',')
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect::<Vec<_>>()
    });

    let analysis = client.analyze(procedure, candidates).await?;
    print_analysis(&analysis);
    Ok(())
}

pub async fn sessions(client: &CptdClient) -> Result<()> {
    let sessions = client.sessions().await?;

    if sessions.is_empty() {
        println!("No saved sessions");
        return Ok(());
    }

    println!("{} session(s):", sessions.len());
    println!();
    for session in sessions {
        println!(
            "  {}  {}  {} message(s), {} code(s)",
            session.session_id.bold(),
            session
                .start_time
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
                .dimmed(),
            session.total_messages,
            session.total_codes_identified,
        );
    }
    Ok(())
}

pub async fn health(client: &CptdClient) -> Result<()> {
    let health = client.health().await?;

    let status = if health.status == "healthy" {
        health.status.green().to_string()
    } else {
        health.status.yellow().to_string()
    };

    println!("cptd v{}  status: {}", health.version, status);
    println!("  uptime:        {}s", health.uptime_seconds);
    println!(
        "  model:         {} ({})",
        health.model,
        if health.llm_available {
            "reachable"
        } else {
            "unreachable"
        }
    );
    println!("  database:      {}", health.database);
    println!(
        "  codes:         {} loaded, {} key indicators, {} with charges",
        health.codes_loaded, health.key_indicators_loaded, health.standard_charges_loaded
    );
    println!("  conversations: {}", health.conversation_dir);
    Ok(())
}

/// Print the per-code summary shown after an answer
pub async fn print_codes_summary(client: &CptdClient, codes: &[String]) -> Result<()> {
    if codes.is_empty() {
        return Ok(());
    }

    println!("{}", "CPT Codes Summary:".bold());
    for code in codes {
        let details = match client.details(base_code(code)).await? {
            Some(details) => details,
            None => {
                println!("  - {}: (not in code table)", code);
                continue;
            }
        };

        println!("  - {}: {}", code.bold(), details.description);
        if details.key_indicator {
            println!("    {}", "✓ KEY INDICATOR".green());
        }
        if details.standard_charge > 0.0 {
            println!("    Standard Charge: ${:.2}", details.standard_charge);
        } else {
            println!("    Standard Charge: N/A");
        }
    }
    println!();
    Ok(())
}

pub fn print_analysis(analysis: &ProcedureAnalysis) {
    println!("{}", "Rules analysis:".bold());
    println!(
        "  recommended: {}",
        analysis.recommended_codes.join(", ").bold()
    );
    if !analysis.excluded_codes.is_empty() {
        println!("  excluded:    {}", analysis.excluded_codes.join(", "));
    }

    let mut flags = Vec::new();
    if analysis.bilateral {
        flags.push("bilateral");
    }
    if analysis.multiple_procedures {
        flags.push("multiple procedures");
    }
    if analysis.bundled_codes {
        flags.push("bundled codes");
    }
    if !flags.is_empty() {
        println!("  flags:       {}", flags.join(", "));
    }

    for explanation in &analysis.explanations {
        println!(
            "  [{}] {}",
            explanation.rule_id.dimmed(),
            explanation.message
        );
    }
    println!();
}
