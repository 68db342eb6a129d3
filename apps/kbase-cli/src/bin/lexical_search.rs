use std::env;

use kbase_core::config::Config;
use kbase_text::LexicalIndex;

fn main() -> anyhow::Result<()> {
    kbase_core::logging::init();
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <query> [top_k]", args[0]);
        eprintln!("Example: {} 'E01故障' 5", args[0]);
        std::process::exit(1);
    }
    let query_text = &args[1];
    let top_k = match args.get(2) {
        Some(raw) => raw.parse::<usize>().map_err(|_| anyhow::anyhow!("top_k must be a number, got '{raw}'"))?,
        None => 10,
    };
    let settings = Config::load()?.settings()?;
    let snapshot = settings.data.lexical_snapshot_path();
    println!("🔍 kbase-lexical-search\n=====================");
    println!("Query: {}", query_text);
    println!("Snapshot: {}", snapshot.display());

    let index = LexicalIndex::open(&snapshot);
    let hits = index.query(query_text, top_k)?;
    println!("\n🔍 Found {} results in {} chunks", hits.len(), index.len());
    for (i, hit) in hits.iter().enumerate() {
        println!("\n  {}. score={:.4}  source={}  page={}  id={}", i + 1, hit.score, hit.chunk.meta.source, hit.chunk.meta.page, hit.chunk.id);
        println!("     📝 {}", hit.chunk.content);
    }
    Ok(())
}
