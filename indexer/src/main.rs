use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use pubsearch_core::persist::{load_snapshot, save_snapshot, IndexPaths};
use pubsearch_core::{BuildStatus, Document, DocumentStore, EngineConfig, MemoryStore, SearchEngine, TextPreprocessor};
use tracing_subscriber::{fmt, EnvFilter};
use walkdir::WalkDir;

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Build and maintain the publication TF-IDF index", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the index from input JSON/JSONL files or a directory
    Build {
        /// Input path (file or directory)
        #[arg(long)]
        input: String,
        /// Output index directory
        #[arg(long)]
        output: String,
    },
    /// Add or replace documents in an existing index without a full rebuild
    Add {
        /// Index directory
        #[arg(long)]
        index: String,
        /// Input path (file or directory)
        #[arg(long)]
        input: String,
    },
    /// Print index statistics as JSON
    Stats {
        #[arg(long)]
        index: String,
    },
    /// Run a query against a saved index
    Search {
        #[arg(long)]
        index: String,
        #[arg(long)]
        query: String,
        #[arg(long, default_value_t = 10)]
        k: usize,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { input, output } => build_index(&input, &output),
        Commands::Add { index, input } => add_documents(&index, &input),
        Commands::Stats { index } => {
            let (_, engine) = open_index(&index)?;
            println!("{}", serde_json::to_string_pretty(&engine.stats()?)?);
            Ok(())
        }
        Commands::Search { index, query, k } => {
            let (_, engine) = open_index(&index)?;
            for hit in engine.search(&query, k)? {
                let doc = engine.document(hit.doc_id)?;
                println!("{:>8.4}  {:>6}  {}", hit.score, hit.doc_id, doc.title);
            }
            Ok(())
        }
    }
}

fn build_index(input: &str, output: &str) -> Result<()> {
    let docs = read_documents(Path::new(input))?;
    tracing::info!(documents = docs.len(), "ingested documents");

    let store = Arc::new(MemoryStore::from_documents(docs));
    let engine = new_engine(store.clone());
    let report = engine.rebuild()?;
    if report.status == BuildStatus::NoDocuments {
        tracing::warn!(input, "no publications found; writing an empty index");
    }

    save(&IndexPaths::new(output), &engine, store.as_ref())?;
    tracing::info!(
        output,
        documents = report.documents_indexed,
        entries = report.entries_created,
        terms = report.unique_terms,
        "index build complete"
    );
    Ok(())
}

fn add_documents(index: &str, input: &str) -> Result<()> {
    let docs = read_documents(Path::new(input))?;
    if docs.is_empty() {
        bail!("no documents found in {input}");
    }
    let (store, engine) = open_index(index)?;
    // Every document must be in the store before weights are computed so N is right.
    for doc in &docs {
        store.upsert(doc.clone());
    }
    let mut entries = 0;
    for doc in &docs {
        entries += engine.update_one(doc)?.entries_created;
    }
    save(&IndexPaths::new(index), &engine, store.as_ref())?;
    let stats = engine.stats()?;
    tracing::info!(
        added = docs.len(),
        entries,
        updates_since_rebuild = stats.updates_since_rebuild,
        "documents reindexed"
    );
    Ok(())
}

fn new_engine(store: Arc<MemoryStore>) -> SearchEngine {
    SearchEngine::new(store, Arc::new(TextPreprocessor::new()), EngineConfig::default())
}

fn open_index(dir: &str) -> Result<(Arc<MemoryStore>, SearchEngine)> {
    let snapshot = load_snapshot(&IndexPaths::new(dir))?;
    let store = Arc::new(MemoryStore::from_documents(snapshot.documents));
    let engine = new_engine(store.clone());
    engine.restore(snapshot.index);
    Ok((store, engine))
}

fn save(paths: &IndexPaths, engine: &SearchEngine, store: &MemoryStore) -> Result<()> {
    let created_at = time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default();
    save_snapshot(paths, &engine.snapshot(), &store.all_documents()?, created_at)
}

fn read_documents(input: &Path) -> Result<Vec<Document>> {
    let mut files: Vec<PathBuf> = Vec::new();
    if input.is_dir() {
        for entry in WalkDir::new(input).into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() && matches!(p.extension().and_then(|s| s.to_str()), Some("json" | "jsonl")) {
                files.push(p.to_path_buf());
            }
        }
        files.sort();
    } else if input.is_file() {
        files.push(input.to_path_buf());
    } else {
        bail!("input {} does not exist", input.display());
    }

    let mut docs = Vec::new();
    for file in files {
        if file.extension().and_then(|s| s.to_str()) == Some("jsonl") {
            read_jsonl(&file, &mut docs)?;
        } else {
            read_json(&file, &mut docs)?;
        }
    }
    Ok(docs)
}

fn read_jsonl(file: &Path, docs: &mut Vec<Document>) -> Result<()> {
    let reader = BufReader::new(File::open(file)?);
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() { continue; }
        docs.push(serde_json::from_str(&line)?);
    }
    Ok(())
}

fn read_json(file: &Path, docs: &mut Vec<Document>) -> Result<()> {
    let reader = BufReader::new(File::open(file)?);
    let json: serde_json::Value = serde_json::from_reader(reader)?;
    match json {
        serde_json::Value::Array(arr) => {
            for v in arr {
                docs.push(serde_json::from_value(v)?);
            }
        }
        serde_json::Value::Object(_) => docs.push(serde_json::from_value(json)?),
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn reads_json_arrays_objects_and_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.json"), r#"[{"id": 1, "title": "A"}, {"id": 2, "title": "B", "abstract": "b"}]"#).unwrap();
        fs::write(dir.path().join("b.json"), r#"{"id": 3, "title": "C"}"#).unwrap();
        fs::write(dir.path().join("c.jsonl"), "{\"id\": 4, \"title\": \"D\"}\n\n{\"id\": 5, \"title\": \"E\"}\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let docs = read_documents(dir.path()).unwrap();
        let ids: Vec<u32> = docs.iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
        assert_eq!(docs[1].abstract_text, "b");
    }

    #[test]
    fn build_then_add_then_search() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("docs.jsonl");
        fs::write(&input, "{\"id\": 1, \"title\": \"graph mining\"}\n{\"id\": 2, \"title\": \"protein folding\"}\n").unwrap();
        let out = dir.path().join("index");
        build_index(input.to_str().unwrap(), out.to_str().unwrap()).unwrap();

        let extra = dir.path().join("extra.json");
        fs::write(&extra, r#"{"id": 3, "title": "quantum graph states"}"#).unwrap();
        add_documents(out.to_str().unwrap(), extra.to_str().unwrap()).unwrap();

        let (store, engine) = open_index(out.to_str().unwrap()).unwrap();
        assert_eq!(store.len(), 3);
        let ids: Vec<u32> = engine.search("quantum", 10).unwrap().iter().map(|h| h.doc_id).collect();
        assert_eq!(ids, vec![3]);
        assert_eq!(engine.stats().unwrap().updates_since_rebuild, 1);
    }

    #[test]
    fn missing_input_is_an_error() {
        assert!(read_documents(Path::new("/definitely/not/here")).is_err());
    }
}
