//! `docrag chat`: a one-user terminal chat over a local document folder.
//!
//! Builds (or reuses) its own vector index, answers a canned summary
//! question, then optionally drops into a REPL. Nothing is shared with the
//! running services: no SQLite, no sentinel.
//!
//! Input and output are generic so a session can be scripted in tests.

use anyhow::{bail, Context, Result};
use std::io::{BufRead, Write};
use std::path::PathBuf;

use crate::config::Config;
use crate::engine::QueryAnswer;
use crate::index::VectorIndex;
use crate::loader::load_documents;
use crate::models::SourceDocument;
use crate::rag::{Backend, HostedProviders, ProviderFactory};

pub const EXAMPLE_QUESTION: &str = "Riassumi i contenuti principali dei documenti";
const EXCERPT_CHARS: usize = 200;
const RULE_WIDTH: usize = 80;

#[derive(Debug, Clone)]
pub struct ChatOptions {
    pub top_k: usize,
    pub documents_dir: Option<PathBuf>,
    pub index_dir: Option<PathBuf>,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            top_k: 3,
            documents_dir: None,
            index_dir: None,
        }
    }
}

/// Entry point for the `chat` subcommand, wired to the terminal.
pub async fn run_chat(config: &Config, options: ChatOptions) -> Result<()> {
    let stdin = std::io::stdin();
    let mut input = stdin.lock();
    let mut out = std::io::stdout();
    let api_key = std::env::var(config.llm.api_key_var())
        .ok()
        .filter(|k| !k.trim().is_empty());
    run_session(
        config,
        &options,
        &HostedProviders,
        api_key,
        &mut input,
        &mut out,
    )
    .await
}

/// Runs one prototype session. `api_key = None` prompts for it on `input`.
pub async fn run_session<R: BufRead, W: Write>(
    config: &Config,
    options: &ChatOptions,
    providers: &dyn ProviderFactory,
    api_key: Option<String>,
    input: &mut R,
    out: &mut W,
) -> Result<()> {
    let documents_dir = options
        .documents_dir
        .clone()
        .unwrap_or_else(|| config.paths.documents_dir.clone());
    let index_dir = options
        .index_dir
        .clone()
        .unwrap_or_else(|| config.paths.index_dir.clone());

    banner(out, "🚀 RAG PROTOTYPE")?;
    writeln!(out, "Chat con i documenti locali\n")?;

    let api_key = match api_key {
        Some(key) => key,
        None => prompt_api_key(config, input, out)?,
    };

    let backend = providers.create(config, &api_key)?;
    writeln!(out, "🤖 Modelli configurati")?;
    writeln!(out, "  ✓ LLM: {}", backend.llm.model_name())?;
    writeln!(out, "  ✓ Embedding: {}", config.embedding.model_for(&config.llm.provider))?;
    writeln!(out, "  ✓ Chunk size: {}", config.chunking.chunk_size)?;
    writeln!(out, "  ✓ Chunk overlap: {}\n", config.chunking.chunk_overlap)?;

    writeln!(out, "📄 Caricamento documenti da: {}", documents_dir.display())?;
    if !documents_dir.exists() {
        std::fs::create_dir_all(&documents_dir)
            .with_context(|| format!("Failed to create {}", documents_dir.display()))?;
    }
    let documents = {
        let dir = documents_dir.clone();
        tokio::task::spawn_blocking(move || load_documents(&dir)).await??
    };
    if documents.is_empty() {
        writeln!(out, "⚠️  Nessun documento trovato!")?;
        writeln!(
            out,
            "Inserisci i tuoi documenti (.pdf, .txt, .docx, .md) in: {}",
            documents_dir.display()
        )?;
        writeln!(out, "Poi riavvia il comando.")?;
        return Ok(());
    }
    writeln!(out, "✅ Caricati {} documenti", documents.len())?;
    for (i, doc) in documents.iter().enumerate() {
        writeln!(out, "  {}. {}", i + 1, doc.file_name)?;
    }
    writeln!(out)?;

    let index = prepare_index(&backend, &documents, &index_dir, input, out).await?;

    banner(out, "📋 ESEMPIO DI QUERY")?;
    writeln!(out, "💬 Domanda: {}\n", EXAMPLE_QUESTION)?;
    let result = backend
        .engine
        .query(&index, EXAMPLE_QUESTION, options.top_k)
        .await?;
    print_detailed(out, &result)?;

    write!(out, "Vuoi avviare la chat interattiva? (s/n): ")?;
    out.flush()?;
    if read_answer(input)?.as_deref() == Some("s") {
        repl(&backend, &index, options.top_k, input, out).await?;
    } else {
        writeln!(out, "\n✅ Prototipo completato.")?;
    }
    Ok(())
}

fn prompt_api_key<R: BufRead, W: Write>(config: &Config, input: &mut R, out: &mut W) -> Result<String> {
    let var = config.llm.api_key_var();
    writeln!(out, "⚠️  {} non trovata nelle variabili d'ambiente", var)?;
    write!(out, "Inserisci la API key: ")?;
    out.flush()?;

    let mut line = String::new();
    input.read_line(&mut line)?;
    let key = line.trim().to_string();
    if key.is_empty() {
        bail!("API key not provided (set {})", var);
    }
    Ok(key)
}

/// Reuses the persisted index when asked to and it loads; otherwise builds
/// and persists a new one.
async fn prepare_index<R: BufRead, W: Write>(
    backend: &Backend,
    documents: &[SourceDocument],
    index_dir: &std::path::Path,
    input: &mut R,
    out: &mut W,
) -> Result<VectorIndex> {
    writeln!(out, "🔍 Indice vettoriale")?;
    if index_dir.exists() {
        writeln!(out, "  ℹ️  Trovato indice esistente in: {}", index_dir.display())?;
        write!(out, "  Vuoi riutilizzarlo? (s/n): ")?;
        out.flush()?;
        if read_answer(input)?.as_deref() == Some("s") {
            match backend.engine.load(index_dir) {
                Some(index) => {
                    writeln!(out, "  ✅ Indice caricato ({} chunk)\n", index.len())?;
                    return Ok(index);
                }
                None => {
                    writeln!(out, "  ⚠️  Impossibile caricare l'indice, ne creo uno nuovo")?;
                }
            }
        }
    }

    writeln!(out, "  🧮 Generazione embeddings...")?;
    let index = backend.engine.build(documents).await?;
    backend.engine.persist(&index, index_dir)?;
    writeln!(
        out,
        "  ✅ Indice creato ({} chunk) e salvato in: {}\n",
        index.len(),
        index_dir.display()
    )?;
    Ok(index)
}

async fn repl<R: BufRead, W: Write>(
    backend: &Backend,
    index: &VectorIndex,
    top_k: usize,
    input: &mut R,
    out: &mut W,
) -> Result<()> {
    banner(out, "💬 CHAT INTERATTIVA")?;
    writeln!(out, "Comandi: 'exit', 'quit' o 'esci' per uscire, 'clear' per pulire lo schermo")?;
    writeln!(out)?;

    loop {
        write!(out, "👤 Tu: ")?;
        out.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            writeln!(out, "\n👋 Arrivederci!")?;
            break;
        }
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        match question.to_lowercase().as_str() {
            "exit" | "quit" | "esci" => {
                writeln!(out, "\n👋 Arrivederci!")?;
                break;
            }
            "clear" => {
                crossterm::execute!(
                    out,
                    crossterm::terminal::Clear(crossterm::terminal::ClearType::All),
                    crossterm::cursor::MoveTo(0, 0)
                )?;
                continue;
            }
            _ => {}
        }

        match backend.engine.query(index, question, top_k).await {
            Ok(result) => {
                writeln!(out, "\n🤖 Assistente: {}\n", result.answer)?;
                if !result.sources.is_empty() {
                    writeln!(out, "📚 Fonti:")?;
                    for source in &result.sources {
                        writeln!(
                            out,
                            "  • {} - Rilevanza: {:.2}",
                            source.file_name, source.score
                        )?;
                    }
                    writeln!(out)?;
                }
            }
            Err(e) => {
                tracing::debug!(error = %format!("{:#}", e), "prototype query failed");
                writeln!(out, "\n❌ Errore: {:#}\n", e)?;
            }
        }
    }
    Ok(())
}

fn print_detailed<W: Write>(out: &mut W, result: &QueryAnswer) -> Result<()> {
    banner(out, "📝 RISPOSTA")?;
    writeln!(out, "{}", result.answer)?;
    banner(out, "📚 FONTI UTILIZZATE")?;
    if result.sources.is_empty() {
        writeln!(out, "⚠️  Nessuna fonte specifica trovata.")?;
    }
    for (i, source) in result.sources.iter().enumerate() {
        writeln!(out, "\n🔖 Fonte #{} (Rilevanza: {:.3})", i + 1, source.score)?;
        writeln!(out, "   📄 File: {}", source.file_name)?;
        writeln!(out, "   📋 Estratto: {}", excerpt(&source.text))?;
    }
    writeln!(out, "\n{}\n", "=".repeat(RULE_WIDTH))?;
    Ok(())
}

/// First 200 characters, with `...` when truncated.
pub fn excerpt(text: &str) -> String {
    if text.chars().count() <= EXCERPT_CHARS {
        return text.to_string();
    }
    let cut: String = text.chars().take(EXCERPT_CHARS).collect();
    format!("{}...", cut)
}

fn banner<W: Write>(out: &mut W, title: &str) -> Result<()> {
    let rule = "=".repeat(RULE_WIDTH);
    writeln!(out, "\n{}\n{}\n{}", rule, title, rule)?;
    Ok(())
}

/// Next line, trimmed and lowercased. `None` at end of input.
fn read_answer<R: BufRead>(input: &mut R) -> Result<Option<String>> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_lowercase()))
}
