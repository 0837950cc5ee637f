use std::io::{self, Write};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::Args;

use crate::app::QuoteApp;
use crate::present::Presenter;
use crate::sync::{Choice, Conflict, WatchOptions};
use crate::transfer::DEFAULT_EXPORT_FILE;

#[derive(Args, Debug, Clone)]
pub struct AddArgs {
    /// Quote text (prompted if omitted)
    #[arg()]
    pub text: Option<String>,
    /// Quote category (prompted if omitted)
    #[arg()]
    pub category: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct ListArgs {
    /// List this category instead of the selected one, without changing the selection
    #[arg(long)]
    pub category: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct FilterArgs {
    /// Category to select
    pub category: String,
}

#[derive(Args, Debug, Clone)]
pub struct ExportArgs {
    /// Destination file
    #[arg(default_value = DEFAULT_EXPORT_FILE)]
    pub path: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct ImportArgs {
    /// JSON file holding an array of quotes
    pub path: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct SyncArgs {
    /// Review conflicts right after merging
    #[arg(long)]
    pub review: bool,
    /// Push the merged store back to the server
    #[arg(long)]
    pub push: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ReviewArgs {
    /// Restore the local category of conflict N (1-based, repeatable)
    #[arg(long, value_name = "N")]
    pub local: Vec<usize>,
    /// Keep every server value without prompting
    #[arg(long, conflicts_with = "local")]
    pub keep_all_remote: bool,
}

#[derive(Args, Debug, Clone)]
pub struct WatchArgs {
    /// Seconds between sync cycles (defaults to sync.interval_secs)
    #[arg(long)]
    pub interval: Option<u64>,
    /// Stop after this many completed cycles
    #[arg(long)]
    pub cycles: Option<u64>,
}

pub fn show<P: Presenter>(app: &mut QuoteApp<P>) -> Result<()> {
    app.show_random()?;
    Ok(())
}

pub fn last<P: Presenter>(app: &mut QuoteApp<P>) -> Result<()> {
    app.show_last()?;
    Ok(())
}

pub fn add<P: Presenter>(app: &mut QuoteApp<P>, args: AddArgs) -> Result<()> {
    let text = match args.text {
        Some(text) => text,
        None => prompt("Quote")?,
    };
    let category = match args.category {
        Some(category) => category,
        None => prompt("Category")?,
    };
    app.add_quote(&text, &category)?;
    Ok(())
}

pub fn list<P: Presenter>(app: &mut QuoteApp<P>, args: ListArgs) -> Result<()> {
    match args.category {
        Some(category) => {
            let selected = app.selected_category();
            app.presenter_mut().select_filter(category.trim());
            app.list();
            app.presenter_mut().select_filter(&selected);
        }
        None => app.list(),
    }
    Ok(())
}

pub fn categories<P: Presenter>(app: &mut QuoteApp<P>) -> Result<()> {
    app.show_categories();
    Ok(())
}

pub fn filter<P: Presenter>(app: &mut QuoteApp<P>, args: FilterArgs) -> Result<()> {
    app.set_filter(&args.category)
}

pub fn export<P: Presenter>(app: &mut QuoteApp<P>, args: ExportArgs) -> Result<()> {
    app.export(&args.path)?;
    Ok(())
}

pub fn import<P: Presenter>(app: &mut QuoteApp<P>, args: ImportArgs) -> Result<()> {
    app.import(&args.path)?;
    Ok(())
}

pub fn sync<P: Presenter>(app: &mut QuoteApp<P>, args: SyncArgs) -> Result<()> {
    let report = app.sync_once()?;
    if args.push {
        app.push()?;
    }
    let has_conflicts = report
        .as_ref()
        .map(|report| report.result.has_conflicts())
        .unwrap_or(false);
    if args.review && has_conflicts {
        review(
            app,
            ReviewArgs {
                local: Vec::new(),
                keep_all_remote: false,
            },
        )?;
    }
    Ok(())
}

pub fn review<P: Presenter>(app: &mut QuoteApp<P>, args: ReviewArgs) -> Result<()> {
    let local = if !args.local.is_empty() {
        to_zero_based(&args.local)?
    } else if args.keep_all_remote || !atty::is(atty::Stream::Stdin) {
        Vec::new()
    } else {
        let conflicts = app.pending_conflicts()?;
        if conflicts.is_empty() {
            Vec::new()
        } else {
            prompt_choices(app.presenter_mut(), &conflicts)?
        }
    };
    app.review(&local)?;
    Ok(())
}

pub fn dismiss<P: Presenter>(app: &mut QuoteApp<P>) -> Result<()> {
    app.dismiss()?;
    Ok(())
}

pub fn push<P: Presenter>(app: &mut QuoteApp<P>) -> Result<()> {
    app.push()
}

pub fn watch<P: Presenter>(app: &mut QuoteApp<P>, args: WatchArgs) -> Result<()> {
    let interval = match args.interval {
        Some(0) => bail!("watch interval must be at least one second"),
        Some(secs) => Duration::from_secs(secs),
        None => app.config.sync.interval(),
    };
    app.watch(WatchOptions {
        interval,
        max_cycles: args.cycles,
    })?;
    Ok(())
}

pub fn end_session<P: Presenter>(app: &mut QuoteApp<P>) -> Result<()> {
    let message = match app.end_session()? {
        Some(info) => format!(
            "Session {} cleared ({} value{} dropped).",
            info.session_id,
            info.keys.len(),
            if info.keys.len() == 1 { "" } else { "s" }
        ),
        None => "No active session.".to_string(),
    };
    app.presenter_mut().notify(&message);
    Ok(())
}

fn to_zero_based(positions: &[usize]) -> Result<Vec<usize>> {
    positions
        .iter()
        .map(|&position| match position {
            0 => bail!("conflict numbers start at 1"),
            n => Ok(n - 1),
        })
        .collect()
}

fn prompt_choices<P: Presenter>(presenter: &mut P, conflicts: &[Conflict]) -> Result<Vec<usize>> {
    let mut local = Vec::new();
    presenter.render_conflicts(conflicts);
    for idx in 0..conflicts.len() {
        loop {
            let answer = prompt(&format!("#{} keep [r]emote or [l]ocal (default remote)", idx + 1))?;
            match parse_choice(&answer) {
                Some(Choice::Local) => {
                    local.push(idx);
                    break;
                }
                Some(Choice::Remote) => break,
                None => presenter.notify("Please answer 'r' or 'l'."),
            }
        }
    }
    Ok(local)
}

fn parse_choice(answer: &str) -> Option<Choice> {
    match answer.trim().to_ascii_lowercase().as_str() {
        "" | "r" => Some(Choice::Remote),
        "l" => Some(Choice::Local),
        other => Choice::from_str(other).ok(),
    }
}

fn prompt(label: &str) -> Result<String> {
    let mut stdout = io::stdout();
    write!(stdout, "{}: ", label)?;
    stdout.flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim_end().to_owned())
}
