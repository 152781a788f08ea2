use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::warn;
use tracing_subscriber::EnvFilter;
use trindex::index::stats::{disk_usage, format_size, show_stats};
use trindex::index::{build, concat_n, Index, IndexConfig, QueryConfig, Section, Writer};
use trindex::query::Query;
use trindex::utils::{format_trigram, parse_trigram};

#[derive(Parser)]
#[command(name = "trindex")]
#[command(about = "Build, merge and inspect trigram index shards")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// JSON file with text-detection limits for create and build
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// JSON file with AND planner settings for query
    #[arg(long, global = true)]
    query_config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Index files and directories into a new shard
    Create {
        /// Shard directory to write
        out: PathBuf,
        /// Files or directories to index
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Prefix to strip from indexed names
        #[arg(long)]
        trim: Option<PathBuf>,
    },
    /// Index a directory tree in parallel chunks and merge the result
    Build {
        /// Directory to index
        root: PathBuf,
        /// Shard directory to write
        out: PathBuf,
    },
    /// Merge shards into one
    Merge {
        /// Shard directory to write
        dest: PathBuf,
        /// Input shards, in docid order
        #[arg(required = true)]
        srcs: Vec<PathBuf>,
    },
    /// List every document of a shard
    Docids {
        dir: PathBuf,
    },
    /// Print the decoded docids, positions or relation bits of a trigram
    Posting {
        dir: PathBuf,
        /// Three bytes of text or a hex value like 0x616263
        trigram: String,
        #[arg(long, value_enum, default_value_t = SectionArg::Docid)]
        section: SectionArg,
    },
    /// Print the meta record of a trigram
    Trigram {
        dir: PathBuf,
        trigram: String,
        #[arg(long, value_enum, default_value_t = SectionArg::Docid)]
        section: SectionArg,
    },
    /// Copy the encoded data of a trigram to stdout
    Raw {
        dir: PathBuf,
        trigram: String,
        #[arg(long, value_enum, default_value_t = SectionArg::Docid)]
        section: SectionArg,
    },
    /// Print every occurrence of a trigram
    Matches {
        dir: PathBuf,
        trigram: String,
    },
    /// Find the exact offsets of a literal
    Search {
        dir: PathBuf,
        literal: String,
    },
    /// List candidate documents for any of the literals
    Query {
        dir: PathBuf,
        #[arg(required = true)]
        literals: Vec<String>,
        /// Evaluate every trigram instead of stopping early
        #[arg(long)]
        exact: bool,
    },
    /// Show disk usage of a shard
    Du {
        dir: PathBuf,
        /// Include the position store and relation stream
        #[arg(long)]
        positional: bool,
    },
    /// Show shard statistics
    Stats {
        dir: PathBuf,
    },
    /// Check a shard for format violations
    Verify {
        dir: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum SectionArg {
    Docid,
    Pos,
    Posrel,
}

impl From<SectionArg> for Section {
    fn from(arg: SectionArg) -> Self {
        match arg {
            SectionArg::Docid => Section::Docid,
            SectionArg::Pos => Section::Pos,
            SectionArg::Posrel => Section::Posrel,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let index_config = match &cli.config {
        Some(path) => IndexConfig::load(path)?,
        None => IndexConfig::default(),
    };
    let query_config = match &cli.query_config {
        Some(path) => QueryConfig::load(path)?,
        None => QueryConfig::default(),
    };

    match cli.command {
        Commands::Create { out, paths, trim } => {
            create(&out, &paths, trim.as_deref(), index_config)?
        }
        Commands::Build { root, out } => {
            let stats = build::build_shard(&root, &out, &index_config)?;
            println!(
                "Indexed {} of {} files into {} ({} rejected, {} unreadable)",
                stats.indexed,
                stats.files,
                out.display(),
                stats.rejected,
                stats.failed
            );
        }
        Commands::Merge { dest, srcs } => {
            let stats = concat_n(&dest, &srcs)?;
            println!(
                "Merged {} shards: {} documents, {} trigrams",
                srcs.len(),
                stats.documents,
                stats.trigrams
            );
        }
        Commands::Docids { dir } => {
            let index = open(&dir)?;
            let map = index.docid_map()?;
            for (docid, name) in map.all().enumerate() {
                println!("{docid}\t{}", String::from_utf8_lossy(name));
            }
        }
        Commands::Posting {
            dir,
            trigram,
            section,
        } => {
            let index = open(&dir)?;
            let t = trigram_arg(&trigram)?;
            let values = index.deltas(section.into(), t)?;
            println!("{} ({} entries)", format_trigram(t), values.len());
            for v in values {
                println!("{v}");
            }
        }
        Commands::Trigram {
            dir,
            trigram,
            section,
        } => {
            let index = open(&dir)?;
            let t = trigram_arg(&trigram)?;
            match index.meta_entry(section.into(), t)? {
                Some(me) => println!(
                    "{:#08x} {} entries={} offset={}",
                    me.trigram,
                    format_trigram(me.trigram),
                    me.entries,
                    me.offset
                ),
                None => bail!("trigram {} not found", format_trigram(t)),
            }
        }
        Commands::Raw {
            dir,
            trigram,
            section,
        } => {
            let index = open(&dir)?;
            let t = trigram_arg(&trigram)?;
            let (data, _) = index.data(section.into(), t)?;
            let mut stdout = io::stdout().lock();
            stdout.write_all(data)?;
            stdout.flush()?;
        }
        Commands::Matches { dir, trigram } => {
            let index = open(&dir)?;
            let t = trigram_arg(&trigram)?;
            let mut map = index.docid_map()?;
            for m in index.matches(t)? {
                println!("{}:{}", map.lookup(m.docid)?, m.position);
            }
        }
        Commands::Search { dir, literal } => {
            let index = open(&dir)?;
            let mut map = index.docid_map()?;
            match index.query_positional(&literal) {
                Ok(hits) => {
                    for m in hits {
                        println!("{}:{}", map.lookup(m.docid)?, m.position);
                    }
                }
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e.into()),
            }
        }
        Commands::Query {
            dir,
            literals,
            exact,
        } => {
            let config = if exact {
                QueryConfig::exact()
            } else {
                query_config
            };
            let index = open(&dir)?.with_query_config(config);
            let query = Query::any_literal(literals.iter().map(String::as_str));
            let docids = index.posting_query(&query)?;
            let mut map = index.docid_map()?;
            for docid in docids {
                println!("{}", map.lookup(docid)?);
            }
        }
        Commands::Du { dir, positional } => {
            let usage = disk_usage(&dir, positional)?;
            for (name, size) in &usage.files {
                println!("{:<26} {}", name, format_size(*size));
            }
            println!("{:<26} {}", "total", format_size(usage.total()));
        }
        Commands::Stats { dir } => show_stats(&dir)?,
        Commands::Verify { dir } => {
            let index = open(&dir)?;
            let report = index.verify()?;
            println!(
                "OK: {} documents, {} trigrams, {} docid entries, {} positions",
                report.documents, report.trigrams, report.docid_entries, report.pos_entries
            );
        }
    }

    Ok(())
}

fn open(dir: &Path) -> Result<Index> {
    Index::open(dir).with_context(|| format!("Failed to open shard {}", dir.display()))
}

fn trigram_arg(s: &str) -> Result<u32> {
    parse_trigram(s).ok_or_else(|| anyhow!("{s:?} is not a trigram (three bytes or 0xNNNNNN)"))
}

fn create(out: &Path, paths: &[PathBuf], trim: Option<&Path>, config: IndexConfig) -> Result<()> {
    let mut writer = Writer::create(out, config)?;
    let mut skipped = 0u32;

    for path in paths {
        if path.is_dir() {
            let prefix = trim.unwrap_or(path);
            writer.add_dir(path, prefix, |file, err| {
                warn!(path = %file.display(), %err, "skipping");
                skipped += 1;
                Ok(())
            })?;
        } else {
            let name = match trim {
                Some(prefix) => path.strip_prefix(prefix).unwrap_or(path),
                None => path,
            };
            let Some(name) = name.to_str() else {
                bail!("{} is not valid UTF-8", path.display());
            };
            match writer.add_file(path, name) {
                Ok(_) => {}
                Err(err) if err.is_rejected() => {
                    warn!(path = %path.display(), %err, "skipping");
                    skipped += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    let documents = writer.docid_count();
    writer.flush()?;
    println!(
        "Wrote {} documents to {} ({} skipped)",
        documents,
        out.display(),
        skipped
    );
    Ok(())
}
