use std::io::{self, Write};

use crossterm::style::Stylize;
use serde::Serialize;

use crate::app::{ProgressEvent, ProgressSink, SyncReport};
use crate::coauthors::CoauthorOutcome;
use crate::orgs::{MatchReport, Resolution};
use crate::publications::PublicationOutcome;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_sync(result: &SyncReport) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_match(result: &MatchReport) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

pub struct ConsoleOutput;

impl ConsoleOutput {
    pub fn print_sync(report: &SyncReport) {
        println!(
            "{}",
            format!("KIRA-SS summary: {} ({})", report.profile, report.pid).cyan()
        );

        let mut skipped = 0usize;
        for outcome in &report.publications {
            match outcome {
                PublicationOutcome::Created { path, .. } => {
                    println!("{}", format!("  + {path}").green())
                }
                PublicationOutcome::Disambiguated { path, .. } => {
                    println!("{}", format!("  + {path} (disambiguated)").green())
                }
                PublicationOutcome::AlreadySynced { .. } => {}
                PublicationOutcome::Skipped { key, reason } => {
                    skipped += 1;
                    println!("{}", format!("  ! {key}: {reason}").red())
                }
            }
        }
        for outcome in &report.coauthors {
            match outcome {
                CoauthorOutcome::Created { path, .. } => {
                    println!("{}", format!("  + {path}").green())
                }
                CoauthorOutcome::Linked { path, .. } => {
                    println!("{}", format!("  ~ {path}").yellow())
                }
                CoauthorOutcome::Unchanged { .. } => {}
                CoauthorOutcome::Skipped { name, reason } => {
                    skipped += 1;
                    println!("{}", format!("  ! {name}: {reason}").red())
                }
            }
        }
        for org in &report.organizations {
            let label = match &org.resolution {
                Resolution::Known { canonical, .. } => format!("  = {} -> {canonical}", org.affiliation),
                Resolution::New { name } => format!("  + {name} (new organization)"),
            };
            println!("{}", label.yellow());
        }

        println!(
            "{}",
            format!(
                "{} notes written, {} publications already synced",
                report.writes(),
                report
                    .publications
                    .iter()
                    .filter(|p| matches!(p, PublicationOutcome::AlreadySynced { .. }))
                    .count()
            )
            .green()
        );
        if skipped > 0 {
            println!("{}", format!("{skipped} records skipped, see log").red());
        }
        if !report.subject_updated {
            println!("{}", format!("subject note {} not updated", report.subject_note).red());
        }
    }

    pub fn print_match(report: &MatchReport) {
        let score = |candidate: &Option<crate::orgs::Candidate>| match candidate {
            Some(c) => format!("{} ({:.3})", c.alias, c.score),
            None => "-".to_string(),
        };
        println!("query:      {}", report.query);
        println!("similarity: {}", score(&report.similarity));
        println!("distance:   {}", score(&report.distance));
        match &report.resolution {
            Resolution::Known { canonical, .. } => {
                println!("{}", format!("known organization: {canonical}").green())
            }
            Resolution::New { name } => {
                println!("{}", format!("new organization: {name}").yellow())
            }
        }
    }
}

impl ProgressSink for ConsoleOutput {
    fn event(&self, event: ProgressEvent) {
        let line = match event.elapsed {
            Some(elapsed) => format!("{} [{}ms]", event.message, elapsed.as_millis()),
            None => event.message,
        };
        eprintln!("{}", line.dark_grey());
    }
}
