use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use crossterm::style::Stylize;
use rand::{rngs::StdRng, SeedableRng};
use tracing_subscriber::EnvFilter;

use fifteen_solver::{
    Board, HeuristicKind, InMemoryReferences, PatternPartition, ReferenceStore, SolveStatus, Solver,
    SolverConfig,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum HeuristicArg {
    Walking,
    Pattern,
    Manhattan,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PatternArg {
    #[value(name = "555")]
    P555,
    #[value(name = "663")]
    P663,
    #[value(name = "78")]
    P78,
}

#[derive(Parser)]
#[command(name = "fifteen-solver")]
#[command(about = "Finds a shortest solution of a 4x4 sliding-tile puzzle")]
struct Cli {
    /// Sixteen tiles in reading order, 0 for the blank; random board when omitted
    tiles: Vec<u8>,

    #[arg(long, value_enum)]
    heuristic: Option<HeuristicArg>,

    /// Pattern database partition
    #[arg(long, value_enum)]
    pattern: Option<PatternArg>,

    /// Give up after this many milliseconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Solve without consulting the reference collection
    #[arg(long)]
    standard: bool,

    /// Plain Manhattan distance for the manhattan heuristic
    #[arg(long)]
    no_linear_conflict: bool,

    /// JSON solver configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Reference collection snapshot, loaded if present and saved afterwards
    #[arg(long)]
    references: Option<PathBuf>,

    /// Seed for the random board
    #[arg(long)]
    seed: Option<u64>,
}

fn load_config(cli: &Cli) -> Result<SolverConfig> {
    let mut config = match &cli.config {
        Some(path) => SolverConfig::from_json_file(path)
            .with_context(|| format!("reading configuration {}", path.display()))?,
        None => SolverConfig::default(),
    };
    if let Some(heuristic) = cli.heuristic {
        config.heuristic = match heuristic {
            HeuristicArg::Walking => HeuristicKind::WalkingDistance,
            HeuristicArg::Pattern => HeuristicKind::PatternDatabase,
            HeuristicArg::Manhattan => HeuristicKind::Manhattan,
        };
    }
    if let Some(pattern) = cli.pattern {
        config.pattern = match pattern {
            PatternArg::P555 => PatternPartition::Pattern555,
            PatternArg::P663 => PatternPartition::Pattern663,
            PatternArg::P78 => PatternPartition::Pattern78,
        };
    }
    if cli.standard {
        config.advanced = false;
    }
    if cli.no_linear_conflict {
        config.linear_conflict = false;
    }
    if cli.timeout.is_some() {
        config.search_timeout_ms = cli.timeout;
    }
    config.validate()?;
    Ok(config)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let board = if cli.tiles.is_empty() {
        let mut rng = match cli.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Board::shuffled(&mut rng)
    } else {
        Board::new(&cli.tiles).context("parsing tiles")?
    };

    let references = match &cli.references {
        Some(path) if path.exists() => Some(Arc::new(
            InMemoryReferences::load_json(path)
                .with_context(|| format!("loading references {}", path.display()))?,
        )),
        Some(_) => Some(Arc::new(InMemoryReferences::new())),
        None => None,
    };

    let mut solver = Solver::from_config(config)?;
    if let Some(store) = &references {
        solver = solver.with_references(store.clone());
    }

    println!("{}\n{}", "Puzzle:".bold(), board);
    println!(
        "{} {} ({})",
        "Estimate:".bold(),
        solver.heuristic_standard(&board)?,
        solver.heuristic_name()
    );
    if solver.advanced() && references.is_some() {
        println!("{} {}", "Advanced estimate:".bold(), solver.heuristic_advanced(&board)?);
    }

    let solution = solver.solve(&board)?;
    match solution.status {
        SolveStatus::Solved => {}
        SolveStatus::Unsolvable => bail!("this board cannot reach the goal"),
        status => {
            println!(
                "{} {:?} after {} nodes, bound {} fully searched",
                "Stopped:".red().bold(),
                status,
                solution.nodes,
                solution.depth
            );
            return Ok(());
        }
    }

    println!(
        "{} {} moves, {} nodes in {:.2?}",
        "Found optimal solution with".green().bold(),
        solution.moves.len(),
        solution.nodes,
        solution.elapsed
    );

    let mut current = board.clone();
    for (step, &dir) in solution.moves.iter().enumerate() {
        current = current.apply_all(&[dir])?;
        println!("{} {}\n{}", format!("{:>2}.", step + 1).dim(), dir.to_string().cyan(), current);
    }

    if let (Some(path), Some(store)) = (&cli.references, &references) {
        store
            .save_json(path)
            .with_context(|| format!("saving references {}", path.display()))?;
        println!("{} {} records", "References:".bold(), store.size()?);
    }
    Ok(())
}
