//! Line-oriented terminal front end for the refresh scheduler.

use tokio::io::{AsyncBufReadExt, BufReader};

use crate::core::calculator;
use crate::core::scheduler::{RefreshEvent, SchedulerHandle};
use crate::currencies::Catalog;
use crate::models::{ChartPoint, PriceQuote};

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Refresh,
    Visible,
    Currency(String),
    Karat(u8),
    Grams(f64),
    Chart,
    Status,
    Currencies,
    Help,
    Quit,
}

pub fn parse_command(line: &str) -> Result<Command, String> {
    let mut parts = line.split_whitespace();
    let Some(head) = parts.next() else {
        return Err("empty command".to_string());
    };
    let arg = parts.next();

    match (head.to_ascii_lowercase().as_str(), arg) {
        ("refresh" | "r", _) => Ok(Command::Refresh),
        ("visible" | "focus", _) => Ok(Command::Visible),
        ("currency" | "c", Some(code)) => Ok(Command::Currency(code.to_ascii_uppercase())),
        ("karat" | "k", Some(k)) => k
            .trim_end_matches(['k', 'K'])
            .parse()
            .map(Command::Karat)
            .map_err(|_| format!("invalid karat '{}'", k)),
        ("grams" | "g", Some(g)) => calculator::parse_grams(g)
            .map(Command::Grams)
            .ok_or_else(|| format!("invalid weight '{}'", g)),
        ("chart", _) => Ok(Command::Chart),
        ("status", _) => Ok(Command::Status),
        ("currencies", _) => Ok(Command::Currencies),
        ("help" | "?", _) => Ok(Command::Help),
        ("quit" | "exit" | "q", _) => Ok(Command::Quit),
        (other, None) if matches!(other, "currency" | "c" | "karat" | "k" | "grams" | "g") => {
            Err(format!("'{}' needs an argument", other))
        }
        (other, _) => Err(format!("unknown command '{}'", other)),
    }
}

pub fn format_quote(quote: &PriceQuote) -> String {
    let mut line = format!(
        "{} {}K: {:.2} {}/g (24K spot {:.4} USD/g, rate {:.4} {:?})",
        quote.currency,
        quote.karat,
        quote.price_per_gram,
        quote.currency,
        quote.usd_per_gram_24k,
        quote.rate,
        quote.rate_source,
    );
    if quote.degraded {
        line.push_str(" [degraded]");
    }
    line
}

pub fn format_chart(points: &[ChartPoint]) -> String {
    if points.is_empty() {
        return "no chart data yet".to_string();
    }
    points
        .iter()
        .map(|p| format!("{:>12}  {:.2}", p.key.to_string(), p.value))
        .collect::<Vec<_>>()
        .join("\n")
}

const HELP: &str = "commands: refresh | visible | currency <CODE> | karat <18|21|22|24> | grams <G> | chart | status | currencies | quit";

/// Reads commands from stdin until `quit` or EOF, printing refresh events as they arrive.
pub async fn run(handle: &SchedulerHandle) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut events = handle.subscribe();
    let mut last_report = None;

    println!("{}", HELP);

    loop {
        tokio::select! {
            changed = events.changed() => {
                if changed.is_err() {
                    tracing::warn!("refresh loop went away");
                    break;
                }
                let event = events.borrow_and_update().clone();
                match event {
                    Some(RefreshEvent::Completed(report)) => {
                        println!("{}", format_quote(&report.quote));
                        if let Some(notice) = &report.notice {
                            println!("notice: {}", notice);
                        }
                        last_report = Some(report);
                    }
                    Some(RefreshEvent::Failed { notice }) => println!("refresh failed: {}", notice),
                    None => {}
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                let command = match parse_command(&line) {
                    Ok(command) => command,
                    Err(e) => {
                        println!("{}", e);
                        continue;
                    }
                };
                match command {
                    Command::Refresh => handle.refresh_now(),
                    Command::Visible => handle.on_visible(),
                    Command::Currency(code) => {
                        if let Err(e) = handle.set_currency(&code) {
                            println!("{}", e);
                        }
                    }
                    Command::Karat(karat) => {
                        if let Err(e) = handle.set_karat(karat) {
                            println!("{}", e);
                        }
                    }
                    Command::Grams(grams) => match &last_report {
                        Some(report) => println!(
                            "{} g = {:.2} {}",
                            grams,
                            calculator::total_for_grams(grams, &report.quote),
                            report.quote.currency
                        ),
                        None => println!("no price yet"),
                    },
                    Command::Chart => match &last_report {
                        Some(report) => println!("{}", format_chart(&report.chart)),
                        None => println!("no chart data yet"),
                    },
                    Command::Status => {
                        let status = handle.status();
                        let selection = handle.selection();
                        println!(
                            "selection {} {}K | last success {} | next due {} | degraded {}",
                            selection.currency,
                            selection.karat,
                            status.last_success_at.map(|t| t.to_rfc3339()).unwrap_or_else(|| "never".to_string()),
                            status.next_due_at.to_rfc3339(),
                            status.degraded,
                        );
                        if let Some(notice) = status.notice {
                            println!("notice: {}", notice);
                        }
                    }
                    Command::Currencies => {
                        for c in Catalog::all() {
                            match c.usd_peg {
                                Some(peg) => println!("{}  {} (pegged {} per USD)", c.code, c.name, peg),
                                None => println!("{}  {}", c.code, c.name),
                            }
                        }
                    }
                    Command::Help => println!("{}", HELP),
                    Command::Quit => break,
                }
            }
        }
    }
    Ok(())
}
