use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use colored::Colorize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use leki_command_center::{analytics, chat, cli, client, config, rag, ui};

use analytics::events::{
    RECENT_ACTIONS, conversion_funnel, daily_trend, filter_identity_events, match_converted_events,
    recent_actions,
};
use analytics::fetch::{fetch_converted_events, fetch_dashboard_data, fetch_metrics, fetch_top_actions};
use analytics::segments::{converted_leads, filter_leads, stage_distribution};
use chat::doctor::Doctor;
use cli::{Cli, Command, KbCommand};
use client::groq::GroqClient;
use client::rest::SupabaseClient;
use config::Settings;
use rag::chunker::{ChunkParams, Chunker};
use rag::embeddings::{Embedder, OpenAiEmbedder};
use rag::pipeline::{DEFAULT_SYSTEM_PROMPT, RagOptions, RagPipeline};
use rag::store::{IngestRequest, KnowledgeBase};
use rag::walker::FileWalker;
use ui::dashboard::{DashboardReport, print_dashboard, print_leads};
use ui::report::{Table, heading, truncate};
use ui::theme::create_skin;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = Settings::new().unwrap_or_else(|e| {
        eprintln!("Config Error: {}", e);
        std::process::exit(1);
    });

    let default_level = if cli.verbose { "debug" } else { settings.log_level.as_str() };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match cli.command {
        Command::Chunk { file, size, overlap, json } => chunk_file(&settings, &file, size, overlap, json),
        Command::Doctor => Doctor::check(&settings).await,
        Command::Dashboard { json } => dashboard(&settings, json).await,
        Command::Leads { segment } => {
            let db = supabase(&settings, false)?;
            let data = fetch_dashboard_data(&db).await?;
            let mut leads = filter_leads(&converted_leads(&data.rollup), segment);
            leads.sort_by(|a, b| b.score().total_cmp(&a.score()));
            print_leads(segment, &leads, &data.events);
            Ok(())
        }
        Command::Kb { action } => kb(&settings, action).await,
        Command::Ingest {
            path,
            source_type,
            disabled,
        } => {
            let db = supabase(&settings, true)?;
            let kb = KnowledgeBase::new(&db);
            let chunker = Chunker::new(settings.chunk_params()?);
            let embedder = ingest_embedder(&settings)?;

            let files = FileWalker::walk(&path)?;
            if files.is_empty() {
                println!("{}", "No text files found.".yellow());
                return Ok(());
            }

            let mut failed = 0;
            for file in files {
                let request = IngestRequest {
                    title: file.title.clone(),
                    text: file.content,
                    source_url: None,
                    source_type,
                    enabled: !disabled,
                };
                match kb.ingest_text(request, &chunker, embedder.as_ref().map(|e| e as &dyn Embedder)).await {
                    Ok(report) => println!(
                        "{} {} ({} chunks{})",
                        "✓".green(),
                        file.path.display(),
                        report.chunks_inserted,
                        if report.embedded { ", embedded" } else { "" }
                    ),
                    Err(e) => {
                        failed += 1;
                        eprintln!("{} {}: {:#}", "✗".red(), file.path.display(), e);
                    }
                }
            }
            if failed > 0 {
                bail!("{} file(s) failed to ingest", failed);
            }
            Ok(())
        }
        Command::Backfill { batch } => {
            let db = supabase(&settings, true)?;
            let embedder = openai_embedder(&settings)?;
            let report = KnowledgeBase::new(&db).backfill_embeddings(&embedder, batch).await?;
            println!(
                "Embedded {} chunks, {} failed.",
                report.succeeded.to_string().green(),
                report.failed.len().to_string().red()
            );
            Ok(())
        }
        Command::Chat => {
            let db = supabase(&settings, false)?;
            let kb = KnowledgeBase::new(&db);
            let embedder = openai_embedder(&settings)?;
            chat::repl::run(&kb, &embedder, groq(&settings)?, rag_options(&settings)).await
        }
        Command::Ask { question, json } => {
            let db = supabase(&settings, false)?;
            let kb = KnowledgeBase::new(&db);
            let embedder = openai_embedder(&settings)?;
            let model = groq(&settings)?;
            let pipeline = RagPipeline::new(&embedder, &model, &kb, rag_options(&settings));

            let answer = pipeline.answer(&question.join(" ")).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&answer)?);
            } else {
                create_skin().print_text(&answer.answer);
            }
            Ok(())
        }
    }
}

fn timeout(settings: &Settings) -> Duration {
    Duration::from_secs(settings.request_timeout_secs)
}

fn supabase(settings: &Settings, write: bool) -> Result<SupabaseClient> {
    let url = Settings::require(&settings.supabase_url, "SUPABASE_URL")?;
    let key = if write { settings.write_key() } else { settings.supabase_key.as_str() };
    let key = Settings::require(key, "SUPABASE_KEY")?;
    Ok(SupabaseClient::new(url, key, timeout(settings))?)
}

fn openai_embedder(settings: &Settings) -> Result<OpenAiEmbedder> {
    let key = Settings::require(&settings.openai_api_key, "OPENAI_API_KEY")?;
    Ok(OpenAiEmbedder::new(
        key.to_string(),
        settings.embedding_model.clone(),
        settings.openai_base_url.clone(),
        settings.embedding_dimensions,
        timeout(settings),
    )?)
}

/// Embedder for ingestion, or `None` to store chunks for a later backfill.
fn ingest_embedder(settings: &Settings) -> Result<Option<OpenAiEmbedder>> {
    if !settings.embed_on_ingest {
        return Ok(None);
    }
    if settings.openai_api_key.trim().is_empty() {
        warn!("OPENAI_API_KEY not set; storing chunks without embeddings (run `leki backfill` later)");
        return Ok(None);
    }
    openai_embedder(settings).map(Some)
}

fn groq(settings: &Settings) -> Result<GroqClient> {
    let key = Settings::require(&settings.groq_api_key, "GROQ_API_KEY")?;
    Ok(GroqClient::new(
        key.to_string(),
        settings.chat_model.clone(),
        settings.groq_base_url.clone(),
        timeout(settings),
    )?)
}

fn rag_options(settings: &Settings) -> RagOptions {
    RagOptions {
        system_prompt: settings
            .system_prompt
            .clone()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
        match_threshold: settings.match_threshold,
        match_count: settings.match_count,
        temperature: settings.temperature,
        max_tokens: settings.max_tokens,
    }
}

fn chunk_file(settings: &Settings, file: &Path, size: Option<usize>, overlap: Option<usize>, json: bool) -> Result<()> {
    let text = fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    let params = ChunkParams::new(
        size.unwrap_or(settings.chunk_size),
        overlap.unwrap_or(settings.chunk_overlap),
    )?;
    let chunks = Chunker::new(params).chunks(&text);

    if json {
        println!("{}", serde_json::to_string_pretty(&chunks)?);
        return Ok(());
    }

    heading(&format!(
        "{}: {} chunks (size {}, overlap {})",
        file.display(),
        chunks.len(),
        params.chunk_size(),
        params.overlap()
    ));
    for chunk in &chunks {
        println!("{} {}", format!("[{}]", chunk.index).cyan(), truncate(&chunk.content, 100));
    }
    Ok(())
}

async fn dashboard(settings: &Settings, json: bool) -> Result<()> {
    let db = supabase(settings, false)?;
    let data = fetch_dashboard_data(&db).await.context("loading dashboard data")?;

    let (metrics, top_actions, converted_events) = tokio::try_join!(
        fetch_metrics(&db, &data.leads),
        fetch_top_actions(&db),
        fetch_converted_events(&db, &data.leads),
    )?;

    let converted = converted_leads(&data.leads);
    let (matched, funnel_basis) = match_converted_events(&converted, &converted_events);
    info!("Matched {} converted-lead events ({:?})", matched.len(), funnel_basis);

    let report = DashboardReport {
        metrics,
        stage_distribution: stage_distribution(&data.leads),
        top_actions,
        funnel: conversion_funnel(&matched),
        funnel_basis,
        event_trend: daily_trend(&data.events),
        converted_trend: daily_trend(&filter_identity_events(&converted_events)),
        recent: recent_actions(&data.events, RECENT_ACTIONS),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_dashboard(&report);
    }
    Ok(())
}

async fn kb(settings: &Settings, action: KbCommand) -> Result<()> {
    let db = supabase(settings, true)?;
    let kb = KnowledgeBase::new(&db);

    match action {
        KbCommand::List { all, limit } => {
            let docs = kb.list_documents(limit, all).await?;
            if docs.is_empty() {
                println!("{}", "No knowledge base documents yet.".dimmed());
                return Ok(());
            }
            let mut table = Table::new(["Title", "Type", "Enabled", "Created", "ID"]);
            for doc in &docs {
                table.row([
                    truncate(&doc.title, 40),
                    doc.source_type.as_str().to_string(),
                    if doc.enabled { "yes" } else { "no" }.to_string(),
                    analytics::format::format_timestamp(doc.created_at),
                    doc.id.clone(),
                ]);
            }
            table.print();
        }
        KbCommand::Show { id } => {
            let Some((doc, chunks)) = kb.document_with_chunks(&id).await? else {
                bail!("No document with id {}", id);
            };
            heading(&doc.title);
            println!("Type: {}   Enabled: {}", doc.source_type.as_str(), doc.enabled);
            if let Some(url) = &doc.source_url {
                println!("Source: {}", url);
            }
            println!("Chunks: {}\n", chunks.len());
            for chunk in &chunks {
                println!("{} {}", format!("[{}]", chunk.chunk_index).cyan(), truncate(&chunk.content, 100));
            }
        }
        KbCommand::Add {
            title,
            file,
            text,
            source_url,
            source_type,
            disabled,
        } => {
            let text = match (text, file) {
                (Some(text), _) => text,
                (None, Some(path)) => {
                    fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?
                }
                (None, None) => bail!("Provide --text or --file"),
            };
            let chunker = Chunker::new(settings.chunk_params()?);
            let embedder = ingest_embedder(settings)?;
            let request = IngestRequest {
                title,
                text,
                source_url,
                source_type,
                enabled: !disabled,
            };
            let report = kb
                .ingest_text(request, &chunker, embedder.as_ref().map(|e| e as &dyn Embedder))
                .await?;
            println!(
                "{} Ingested {} chunks for '{}' ({})",
                "✓".green(),
                report.chunks_inserted,
                report.document.title,
                report.document.id
            );
        }
        KbCommand::Snippet { text } => {
            let embedder = openai_embedder(settings)?;
            let document_id = kb.add_snippet(&text.join(" "), &embedder).await?;
            println!("{} Snippet added to document {}", "✓".green(), document_id);
        }
        KbCommand::Enable { id } => {
            kb.set_enabled(&id, true).await?;
            println!("{} Enabled {}", "✓".green(), id);
        }
        KbCommand::Disable { id } => {
            kb.set_enabled(&id, false).await?;
            println!("{} Disabled {}", "✓".green(), id);
        }
        KbCommand::Delete { id } => {
            kb.delete_document(&id).await?;
            println!("{} Deleted {}", "✓".green(), id);
        }
        KbCommand::Stats => {
            let stats = kb.stats().await?;
            let mut table = Table::new(["Documents", "Enabled", "Chunks"]);
            table.row([
                stats.total_documents.to_string(),
                stats.enabled_documents.to_string(),
                stats.total_chunks.to_string(),
            ]);
            table.print();
        }
    }
    Ok(())
}
