use anyhow::{Context, Result};
use chordalysis::{
    Dataset, Exploration, Explorer, Format, MissingValues, Schema, SearchConfig, Termination,
};
use clap::{ArgAction, Parser, ValueEnum};
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_subscriber::fmt::SubscriberBuilder;

#[derive(Parser)]
#[command(name = "chordalysis-mml")]
#[command(about = "Learn a decomposable model of categorical data by minimum message length")]
struct Cmd {
    /// Delimited text whose first line names the variables
    input: PathBuf,

    /// Field delimiter of the input
    #[arg(long, value_enum, default_value = "tsv")]
    format: InputFormat,

    /// Whether missing values ("" or "?") get a category of their own
    #[arg(long, value_enum, default_value = "reserve")]
    missing: Missing,

    /// Stop after adding this many edges
    #[arg(long)]
    max_steps: Option<usize>,

    /// Read the input twice instead of holding it in memory
    #[arg(long)]
    streaming: bool,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,

    /// Log more detail to stderr; repeat for more
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, Copy, ValueEnum)]
enum InputFormat {
    Tsv,
    Csv,
}

#[derive(Clone, Copy, ValueEnum)]
enum Missing {
    Reserve,
    Reject,
}

#[derive(Serialize)]
struct Report<'a> {
    instances: usize,
    variables: usize,
    termination: &'static str,
    edges: Vec<EdgeReport<'a>>,
    cliques: Vec<Vec<&'a str>>,
    data_fit: f64,
    structure: f64,
    full: f64,
}

#[derive(Serialize)]
struct EdgeReport<'a> {
    a: &'a str,
    b: &'a str,
    score: f64,
    full: f64,
}

fn main() -> Result<()> {
    let cmd = Cmd::parse();
    let level = match cmd.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    SubscriberBuilder::default()
        .with_target(false)
        .with_max_level(level)
        .with_writer(io::stderr)
        .init();

    let format = match cmd.format {
        InputFormat::Tsv => Format::Tsv,
        InputFormat::Csv => Format::Csv,
    };
    let mut config = SearchConfig::default().with_missing_values(match cmd.missing {
        Missing::Reserve => MissingValues::Reserve,
        Missing::Reject => MissingValues::Reject,
    });
    config.max_steps = cmd.max_steps;

    let dataset: Dataset;
    let scanned: Schema;
    let (mut explorer, schema) = if cmd.streaming {
        scanned = Schema::scan(open(&cmd.input)?, format)?;
        let explorer = Explorer::from_stream(&scanned, open(&cmd.input)?, format, &config)?;
        (explorer, &scanned)
    } else {
        dataset = Dataset::from_reader(open(&cmd.input)?, format)?;
        (Explorer::new(&dataset, &config)?, dataset.schema())
    };

    let exploration = explorer.explore();
    let report = report(&explorer, &exploration, schema);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if cmd.json {
        serde_json::to_writer_pretty(&mut out, &report)?;
        writeln!(out)?;
    } else {
        print_text(&mut out, &report)?;
    }
    Ok(())
}

fn open(path: &Path) -> Result<BufReader<File>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    Ok(BufReader::new(file))
}

fn report<'a>(explorer: &Explorer, exploration: &Exploration, schema: &'a Schema) -> Report<'a> {
    let name = |variable: u32| schema.variable(variable as usize).name();
    Report {
        instances: explorer.n_instances(),
        variables: explorer.n_variables(),
        termination: match exploration.termination {
            Termination::NoImprovement => "no improving edge",
            Termination::NoCandidates => "no addable edge",
            Termination::StepBudget => "step budget reached",
        },
        edges: explorer
            .steps()
            .iter()
            .map(|step| EdgeReport {
                a: name(step.action.action.a()),
                b: name(step.action.action.b()),
                score: step.action.score,
                full: step.full(),
            })
            .collect(),
        cliques: explorer
            .model()
            .cliques()
            .iter()
            .map(|clique| clique.iter().map(name).collect())
            .collect(),
        data_fit: exploration.data_fit,
        structure: exploration.structure,
        full: exploration.full(),
    }
}

fn print_text<W: Write>(out: &mut W, report: &Report<'_>) -> io::Result<()> {
    writeln!(
        out,
        "data: {} instances of {} variables",
        report.instances, report.variables
    )?;
    for edge in report.edges.iter() {
        writeln!(
            out,
            "  + {} -- {}: gain {:.5} nats, total {:.5} nats",
            edge.a, edge.b, edge.score, edge.full
        )?;
    }
    writeln!(out, "stopped: {}", report.termination)?;
    writeln!(out, "cliques:")?;
    for clique in report.cliques.iter() {
        writeln!(out, "  {}", clique.join(" "))?;
    }
    writeln!(out, "data-fit message length: {:.5} nats", report.data_fit)?;
    writeln!(out, "structure message length: {:.5} nats", report.structure)?;
    writeln!(out, "total message length: {:.5} nats", report.full)?;
    Ok(())
}
