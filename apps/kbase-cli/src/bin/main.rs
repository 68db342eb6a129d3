use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use kbase_core::config::{Config, Settings};
use kbase_core::error::Error;
use kbase_embed::{get_default_embedder, get_default_reranker};
use kbase_hybrid::{Ingestor, RetrievalPipeline, SearchOutcome};
use kbase_text::LexicalIndex;
use kbase_vector::LanceVectorIndex;

fn parse_args() -> (String, Vec<String>) {
    let mut args: Vec<String> = env::args().collect();
    let prog = args.remove(0);
    if args.is_empty() { usage(&prog); }
    let cmd = args.remove(0);
    (cmd, args)
}

fn usage(prog: &str) -> ! {
    eprintln!("Usage: {} ingest <file.txt|dir> [source]", prog);
    eprintln!("       {} query \"<question>\" [final_k]", prog);
    eprintln!("Pages inside a .txt file are separated by form feed (\\x0c).");
    std::process::exit(1)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    kbase_core::logging::init();
    let config = Config::load().map_err(|e| { eprintln!("Error loading config: {}", e); e })?;
    let settings = config.settings()?;
    let (cmd, args) = parse_args();
    match cmd.as_str() {
        "ingest" => {
            let Some(target) = args.first().map(PathBuf::from) else { usage("kbase") };
            ingest(&settings, &target, args.get(1).cloned()).await?;
        }
        "query" => {
            let Some(question) = args.first().cloned() else { usage("kbase") };
            let final_k = match args.get(1) {
                Some(raw) => Some(raw.parse::<usize>().map_err(|_| Error::InvalidRequest(format!("final_k must be a number, got '{raw}'")))?),
                None => None,
            };
            query(&settings, &question, final_k).await?;
        }
        _ => { eprintln!("Unknown command: {}", cmd); std::process::exit(1); }
    }
    Ok(())
}

async fn open_indexes(settings: &Settings, dim: usize) -> anyhow::Result<(Arc<LexicalIndex>, Arc<LanceVectorIndex>)> {
    let db_path = settings.data.db_path();
    std::fs::create_dir_all(&db_path)?;
    let text = Arc::new(LexicalIndex::open(settings.data.lexical_snapshot_path()));
    let vector = Arc::new(LanceVectorIndex::open(&db_path, &settings.data.vector_table, dim).await?);
    Ok((text, vector))
}

async fn ingest(settings: &Settings, target: &Path, source: Option<String>) -> anyhow::Result<()> {
    if !target.exists() {
        return Err(Error::NotFound(target.display().to_string()).into());
    }
    let files: Vec<PathBuf> = if target.is_dir() {
        walkdir::WalkDir::new(target)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && e.path().extension().is_some_and(|ext| ext == "txt"))
            .map(|e| e.into_path())
            .collect()
    } else {
        vec![target.to_path_buf()]
    };
    println!("Ingesting {} file(s) from {}", files.len(), target.display());

    let embedder = get_default_embedder(&settings.models)?;
    let (text, vector) = open_indexes(settings, embedder.dim()).await?;
    let ingestor = Ingestor::new(text, vector, embedder, &settings.ingest);

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(ProgressStyle::default_bar().template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files {msg}")?.progress_chars("#>-"));
    let mut total = 0usize;
    for file in &files {
        let name = match &source {
            Some(s) if !target.is_dir() => s.clone(),
            _ => source_name(target, file),
        };
        pb.set_message(name.clone());
        let pages = read_pages(file)?;
        total += ingestor.ingest(&name, &pages).await?;
        pb.inc(1);
    }
    pb.finish_with_message("done");
    info!(files = files.len(), chunks = total, "ingest finished");
    println!("✅ Ingest complete ({} chunks)", total);
    Ok(())
}

/// Path relative to the ingested directory, or the file name for a single file.
fn source_name(root: &Path, file: &Path) -> String {
    match file.strip_prefix(root) {
        Ok(rel) if !rel.as_os_str().is_empty() => rel.to_string_lossy().to_string(),
        _ => file.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_else(|| file.display().to_string()),
    }
}

/// Form-feed separated pages, numbered from 1. Invalid UTF-8 is replaced.
fn read_pages(file: &Path) -> anyhow::Result<Vec<(u32, String)>> {
    let bytes = std::fs::read(file)?;
    let raw = String::from_utf8_lossy(&bytes);
    Ok(raw.split('\x0c').enumerate().map(|(i, page)| (i as u32 + 1, page.to_string())).collect())
}

async fn query(settings: &Settings, question: &str, final_k: Option<usize>) -> anyhow::Result<()> {
    let embedder = get_default_embedder(&settings.models)?;
    let reranker = get_default_reranker(&settings.models)?;
    let (text, vector) = open_indexes(settings, embedder.dim()).await?;
    let pipeline = RetrievalPipeline::new(text, vector, embedder, reranker, settings.retrieval.clone());

    println!("🔍 {}", question);
    let outcome = match final_k {
        Some(k) => pipeline.search(question, k).await?,
        None => pipeline.search_default(question).await?,
    };
    match outcome {
        SearchOutcome::NoRelevantInformation => println!("No relevant information found."),
        SearchOutcome::Found(results) => {
            for (i, r) in results.iter().enumerate() {
                println!("\n  {}. score={:.4}  source={}  page={}  id={}", i + 1, r.score, r.chunk.meta.source, r.chunk.meta.page, r.chunk.id);
                println!("     📝 {}", r.chunk.content);
            }
        }
    }
    Ok(())
}
