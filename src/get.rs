//! Document inspection commands: `list`, `get`, `summarize`.

use anyhow::Result;

use crate::service::DocumentService;

pub async fn run_list(service: &DocumentService) -> Result<()> {
    let docs = service.list().await?;
    if docs.is_empty() {
        println!("No documents.");
        return Ok(());
    }
    for doc in docs {
        println!(
            "{}  {}  {}  chars={} chunks={}{}",
            doc.id,
            doc.created_at.format("%Y-%m-%d %H:%M:%S"),
            doc.filename,
            doc.char_count,
            doc.chunk_count,
            if doc.summary.is_some() { " summarized" } else { "" }
        );
    }
    Ok(())
}

pub async fn run_get(service: &DocumentService, id: &str) -> Result<()> {
    let doc = service.get(id).await?;
    println!("--- Document ---");
    println!("id:           {}", doc.id);
    println!("filename:     {}", doc.filename);
    println!("content_type: {}", doc.content_type);
    println!("created_at:   {}", doc.created_at.to_rfc3339());
    if let Some(summary) = &doc.summary {
        println!("summary:      {}", summary);
    }
    println!();
    println!("{}", doc.text);
    Ok(())
}

pub async fn run_summarize(service: &DocumentService, id: &str, refresh: bool) -> Result<()> {
    let outcome = service.summarize(id, refresh).await?;
    let origin = match (outcome.cached, outcome.mode) {
        (true, _) => "cached".to_string(),
        (false, Some(mode)) => format!("{:?}", mode).to_lowercase(),
        (false, None) => "new".to_string(),
    };
    println!("Summary of {} ({}):", outcome.filename, origin);
    println!();
    println!("{}", outcome.summary);
    Ok(())
}
