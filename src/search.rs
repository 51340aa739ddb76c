//! `docsage query` and `docsage reindex`.

use anyhow::Result;

use docsage_core::models::AnswerMode;

use crate::service::DocumentService;

pub async fn run_query(
    service: &DocumentService,
    text: &str,
    document_id: Option<&str>,
    show_evidence: bool,
) -> Result<()> {
    let result = service.query(text, document_id).await?;
    println!("{}", result.answer);

    if result.mode == AnswerMode::NoMatch {
        return Ok(());
    }
    println!();
    println!("Source: {} ({})", result.filename, result.document_id);

    if show_evidence {
        println!();
        println!("Evidence:");
        for (i, ev) in result.evidence.iter().enumerate() {
            println!(
                "  [{}] {} chunk {}  score={:.3}",
                i + 1,
                ev.filename,
                ev.ordinal,
                ev.score
            );
            for line in ev.excerpt.lines() {
                println!("      {}", line);
            }
        }
    }
    Ok(())
}

pub async fn run_reindex(service: &DocumentService, document_id: Option<&str>) -> Result<()> {
    let outcomes = service.reindex(document_id).await?;
    for o in &outcomes {
        println!("reindexed {}  chunks={}", o.document_id, o.chunk_count);
    }
    println!("{} document(s) reindexed", outcomes.len());
    Ok(())
}
