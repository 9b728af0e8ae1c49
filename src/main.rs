use std::io::{self, BufRead, Write};
use std::process::ExitCode;

use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::error;

use lingo::card::{self, CardSet};
use lingo::config::Config;
use lingo::review::{self, QueueKind};
use lingo::sm2::{self, Rating};
use lingo::store::{self, ReviewStore};
use lingo::web::{self, ServerState};
use lingo::{Error, Result};

#[derive(Parser)]
#[command(name = "lingo", version, about = "Spaced-repetition review for language decks")]
struct Cli {
    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Review cards in the terminal
    Drill {
        /// Deck CSV files or directories
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Start the JSON review API
    Serve {
        /// Deck CSV files or directories
        #[arg(required = true)]
        paths: Vec<String>,

        #[arg(short, long, default_value_t = 3000)]
        port: u16,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Drill { paths } => drill(&cli.config, &paths),
        Commands::Serve { paths, port } => serve(cli.config, &paths, port),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn load_cards(paths: &[String]) -> Result<CardSet> {
    let cards = CardSet::load(paths)?;
    if cards.is_empty() {
        return Err(Error::InvalidInput(format!(
            "no cards found in {}",
            paths.join(", ")
        )));
    }
    Ok(cards)
}

fn serve(config: Config, paths: &[String], port: u16) -> Result<()> {
    let cards = load_cards(paths)?;
    let store = store::load_reviews(&config.reviews)?;
    let progress = store::load_progress(&config.progress)?;

    let state = ServerState::new(cards, store, progress, config);
    tokio::runtime::Runtime::new()?.block_on(web::serve(state, port))
}

fn drill(config: &Config, paths: &[String]) -> Result<()> {
    let cards = load_cards(paths)?;
    let mut store = store::load_reviews(&config.reviews)?;
    let mut progress = store::load_progress(&config.progress)?;
    let user = config.user.as_str();

    let now = Utc::now();
    let states = store.states_for(user);

    println!("Decks for {user}:");
    for s in review::deck_summaries(&cards.cards, &states, now) {
        println!(
            "  {} ({} due, {} new / {} total)",
            s.name, s.due, s.new, s.total
        );
    }
    println!();

    let selection = review::select_for_review(&cards.cards, &states, now, config.new_limit);
    if selection.is_empty() {
        println!("No cards due for review.");
        return Ok(());
    }
    let kind = match selection.kind {
        QueueKind::Due => "due",
        QueueKind::New => "new",
    };
    println!("{} {kind} cards.\n", selection.indices.len());

    // Drill loop
    let mut counts = [0u32; 6];
    let stdin = io::stdin();
    let mut stdin = stdin.lock();
    let mut buf = String::new();

    for (n, &i) in selection.indices.iter().enumerate() {
        let c = &cards.cards[i];
        println!("[{}/{}] {}", n + 1, selection.indices.len(), c.deck);
        println!();
        println!("{}", card::expand_newlines(&c.front));
        println!();

        print!("Press Enter to reveal...");
        io::stdout().flush()?;
        buf.clear();
        if stdin.read_line(&mut buf)? == 0 {
            break;
        }

        println!("{}", card::expand_newlines(&c.back));
        println!();

        let prior = store.get(user, &c.id);
        let hints = sm2::preview_intervals(prior.as_ref(), Utc::now())?
            .iter()
            .map(|(r, days)| format!("{}={} {days}d", r.value(), r.label()))
            .collect::<Vec<_>>()
            .join("  ");

        let rating = loop {
            print!("Rate [{hints}]: ");
            io::stdout().flush()?;
            buf.clear();
            if stdin.read_line(&mut buf)? == 0 {
                break None;
            }
            match buf.parse::<Rating>() {
                Ok(r) => break Some(r),
                Err(e) => println!("{e}."),
            }
        };
        let Some(rating) = rating else {
            break;
        };

        let now = Utc::now();
        review::submit_review(&mut store, user, &c.id, rating, now)?;
        progress
            .entry(user.to_string())
            .or_default()
            .record_review(now.date_naive(), rating);
        counts[usize::from(rating.value())] += 1;
        println!();
    }

    store::save_reviews(&config.reviews, &store)?;
    store::save_progress(&config.progress, &progress)?;

    // Session summary
    println!("Session complete!");
    let tally: Vec<String> = Rating::all()
        .map(|r| format!("{}: {}", r.label(), counts[usize::from(r.value())]))
        .collect();
    println!("  {}", tally.join(", "));
    if let Some(p) = progress.get(user) {
        println!(
            "  Streak: {} day(s), longest {}",
            p.current_streak, p.longest_streak
        );
    }
    Ok(())
}
