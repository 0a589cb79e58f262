use anyhow::{Context, Result, bail};
use brick::{
    config::{DEFAULT_SLICE_SIZE, SeqNameFormat},
    engine::{BrickEngine, Engine, Operation, Workflow},
    file_validation::{self, FileFormat, FileRequest, FileType},
    ring::RingId,
    session::Session,
    slicing,
};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use env_logger::Env;
use serde::Serialize;
use std::{
    fs,
    path::{Path, PathBuf},
};

const DEFAULT_SESSION_PATH: &str = ".brick_session.json";

#[derive(Parser, Debug)]
#[command(
    name = "brick_cli",
    about = "Build and reorder BRICK rings in a session file",
    disable_version_flag = true
)]
struct Args {
    /// Print version information
    #[arg(short = 'V', long)]
    version: bool,

    /// Session JSON file to read and update
    #[arg(long, global = true, default_value = DEFAULT_SESSION_PATH)]
    session: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start a new, empty session file
    Init {
        #[arg(long)]
        id: Option<String>,
        /// Overwrite an existing session file
        #[arg(long)]
        force: bool,
    },
    /// Print supported operations and ring kinds
    Capabilities,
    /// Print files and rings of the session, grouped by reference
    Summary,
    /// Validate uploaded files and add them to the session
    Validate {
        #[arg(long, value_enum)]
        format: FormatArg,
        #[arg(long = "type", value_enum)]
        file_type: TypeArg,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Apply one operation given as JSON (or @file.json)
    Op { json: String },
    /// Apply a workflow given as JSON (or @file.json)
    Workflow { json: String },
    /// Move a ring to a new index
    Reorder {
        /// Comma-separated ring ids forming the reordering scope
        #[arg(long, value_delimiter = ',')]
        group: Option<Vec<RingId>>,
        id: RingId,
        index: usize,
    },
    /// Delete a ring and close the gap it leaves
    Delete {
        #[arg(long, value_delimiter = ',')]
        group: Option<Vec<RingId>>,
        id: RingId,
    },
    /// Cut FASTA records into fixed-size windows for the classifier
    Slice {
        input: PathBuf,
        output: PathBuf,
        #[arg(long, default_value_t = DEFAULT_SLICE_SIZE)]
        size: usize,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FormatArg {
    Fasta,
    Genbank,
    Tsv,
}

impl From<FormatArg> for FileFormat {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::Fasta => FileFormat::Fasta,
            FormatArg::Genbank => FileFormat::Genbank,
            FormatArg::Tsv => FileFormat::Tsv,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum TypeArg {
    Reference,
    Genome,
    AnnotationGenbank,
    AnnotationCustom,
}

impl From<TypeArg> for FileType {
    fn from(value: TypeArg) -> Self {
        match value {
            TypeArg::Reference => FileType::Reference,
            TypeArg::Genome => FileType::Genome,
            TypeArg::AnnotationGenbank => FileType::AnnotationGenbank,
            TypeArg::AnnotationCustom => FileType::AnnotationCustom,
        }
    }
}

#[derive(Serialize)]
struct RingSummary {
    id: String,
    index: i64,
    #[serde(rename = "type")]
    ring_type: String,
    title: String,
    segments: usize,
    visible: bool,
}

#[derive(Serialize)]
struct GroupSummary {
    reference: String,
    rings: Vec<RingSummary>,
}

#[derive(Serialize)]
struct SessionSummary {
    id: String,
    date: u64,
    file_count: usize,
    ring_count: usize,
    groups: Vec<GroupSummary>,
    consistent: bool,
}

fn load_json_arg(value: &str) -> Result<String> {
    match value.strip_prefix('@') {
        Some(path) => {
            fs::read_to_string(path).with_context(|| format!("Could not read JSON file '{path}'"))
        }
        None => Ok(value.to_string()),
    }
}

fn load_session(path: &Path) -> Result<Session> {
    if path.exists() {
        Ok(Session::load_from_path(path)?)
    } else {
        Ok(Session::new(None))
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("Could not serialize JSON output")?;
    println!("{text}");
    Ok(())
}

fn summarize(session: &Session) -> SessionSummary {
    let groups = session
        .group_keys()
        .into_iter()
        .map(|key| GroupSummary {
            reference: key
                .as_ref()
                .map_or_else(|| "unreferenced".to_string(), |k| k.to_string()),
            rings: session
                .group(key.as_ref())
                .into_iter()
                .map(|ring| RingSummary {
                    id: ring.id.clone(),
                    index: ring.index,
                    ring_type: ring.ring_type.to_string(),
                    title: ring.title.clone(),
                    segments: ring.data.len(),
                    visible: ring.visible,
                })
                .collect(),
        })
        .collect();
    SessionSummary {
        id: session.id.clone(),
        date: session.date,
        file_count: session.files.len(),
        ring_count: session.rings.len(),
        groups,
        consistent: session.validate().is_ok(),
    }
}

/// Applies `ops` to the session at `path` and saves it only if all succeed.
fn run_ops(path: &Path, run_id: Option<String>, ops: Vec<Operation>) -> Result<()> {
    let mut engine = BrickEngine::from_session(load_session(path)?);
    let results = match run_id {
        Some(run_id) => engine.apply_workflow(Workflow { run_id, ops })?,
        None => ops
            .into_iter()
            .map(|op| engine.apply(op))
            .collect::<brick::Result<Vec<_>>>()?,
    };
    engine.session().save_to_path(path)?;
    if results.len() == 1 {
        print_json(&results[0])
    } else {
        print_json(&results)
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    if args.version {
        println!("{}", brick::version_cli_text());
        return Ok(());
    }
    let Some(command) = args.command else {
        Args::command().print_help()?;
        bail!("Missing command");
    };
    let session_path = args.session.as_path();

    match command {
        Command::Init { id, force } => {
            if session_path.exists() && !force {
                bail!(
                    "Session file '{}' already exists, use --force to replace it",
                    session_path.display()
                );
            }
            let session = Session::new(id);
            session.save_to_path(session_path)?;
            println!("Created session '{}' in '{}'", session.id, session_path.display());
            Ok(())
        }
        Command::Capabilities => print_json(&BrickEngine::capabilities()),
        Command::Summary => print_json(&summarize(&load_session(session_path)?)),
        Command::Validate {
            format,
            file_type,
            files,
        } => {
            let requests: Vec<FileRequest> = files
                .iter()
                .map(|path| FileRequest {
                    path: path.to_string_lossy().to_string(),
                    format: format.into(),
                    file_type: file_type.into(),
                    original_name: None,
                })
                .collect();
            let mut session = load_session(session_path)?;
            let mut failed = 0;
            let results = file_validation::validate_files(&requests);
            for (request, result) in requests.iter().zip(results) {
                match result.and_then(|file| session.add_file(file)) {
                    Ok(()) => println!("OK\t{}", request.path),
                    Err(e) => {
                        failed += 1;
                        eprintln!("FAILED\t{}\t{e}", request.path);
                    }
                }
            }
            session.save_to_path(session_path)?;
            if failed > 0 {
                bail!("{failed} of {} files failed validation", requests.len());
            }
            Ok(())
        }
        Command::Op { json } => {
            let json = load_json_arg(&json)?;
            let op: Operation = serde_json::from_str(&json).context("Invalid operation JSON")?;
            run_ops(session_path, None, vec![op])
        }
        Command::Workflow { json } => {
            let json = load_json_arg(&json)?;
            let wf: Workflow = serde_json::from_str(&json).context("Invalid workflow JSON")?;
            run_ops(session_path, Some(wf.run_id), wf.ops)
        }
        Command::Reorder { group, id, index } => run_ops(
            session_path,
            None,
            vec![Operation::Reorder {
                index_group: group,
                id,
                index,
            }],
        ),
        Command::Delete { group, id } => run_ops(
            session_path,
            None,
            vec![Operation::Delete {
                index_group: group,
                id,
            }],
        ),
        Command::Slice {
            input,
            output,
            size,
        } => {
            let summary = slicing::slice_fasta(&input, &output, size, &SeqNameFormat::default())?;
            print_json(&summary)
        }
    }
}
