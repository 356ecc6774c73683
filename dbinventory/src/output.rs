//! Report rendering and file output.
//!
//! Handles the text table, the JSON document and writing the report to a
//! file with optional compression.

use clap::ValueEnum;
use dbinventory_core::error::InventoryError;
use dbinventory_core::inventory::{BatchMetadata, BatchResult, InstanceFailure};
use dbinventory_core::{ReportRow, Result, display_fields};
use serde::Serialize;
use std::path::Path;

/// Report format on stdout
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Aligned text table
    Table,
    /// Pretty-printed JSON document
    Json,
}

/// JSON report document
#[derive(Debug, Serialize)]
pub struct JsonReport<'a> {
    /// Column names in display order
    pub fields: Vec<&'static str>,
    /// Reported databases
    pub databases: Vec<ReportRow>,
    /// Instances that could not be reported
    pub failures: &'a [InstanceFailure],
    /// Run statistics
    pub metadata: &'a BatchMetadata,
}

impl<'a> JsonReport<'a> {
    /// Builds the document for a batch result.
    pub fn new(result: &'a BatchResult) -> Self {
        Self {
            fields: display_fields(result.metadata.staleness_active),
            databases: result.rows(),
            failures: &result.failures,
            metadata: &result.metadata,
        }
    }
}

/// Renders the report in the requested format.
///
/// # Errors
/// Returns a serialization error if the JSON document cannot be built.
pub fn render(result: &BatchResult, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Table => Ok(render_table(result)),
        OutputFormat::Json => render_json(result),
    }
}

/// Renders the report rows as an aligned text table.
pub fn render_table(result: &BatchResult) -> String {
    let headers = display_fields(result.metadata.staleness_active);
    let rows: Vec<Vec<String>> = result.rows().iter().map(ReportRow::cells).collect();

    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut table = String::new();
    push_line(&mut table, headers.iter().map(|h| h.to_string()), &widths);
    push_line(&mut table, widths.iter().map(|w| "-".repeat(*w)), &widths);
    for row in rows {
        push_line(&mut table, row.into_iter(), &widths);
    }
    table
}

fn push_line(table: &mut String, cells: impl Iterator<Item = String>, widths: &[usize]) {
    let line = cells
        .zip(widths)
        .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
        .collect::<Vec<_>>()
        .join("  ");
    table.push_str(line.trim_end());
    table.push('\n');
}

/// Renders the JSON report document.
///
/// # Errors
/// Returns a serialization error if the document cannot be serialized.
pub fn render_json(result: &BatchResult) -> Result<String> {
    serde_json::to_string_pretty(&JsonReport::new(result)).map_err(|e| {
        InventoryError::Serialization {
            context: "JSON report".to_string(),
            source: e,
        }
    })
}

/// Saves the report to a file, compressing it when requested.
///
/// # Errors
/// Returns an I/O error if the file cannot be written, or a configuration
/// error if compression was requested in a build without it.
pub async fn save_report(content: &str, output_path: &Path, compress: bool) -> Result<()> {
    if compress {
        #[cfg(feature = "compression")]
        {
            save_compressed(content, output_path).await
        }
        #[cfg(not(feature = "compression"))]
        {
            let _ = (content, output_path);
            Err(InventoryError::configuration(
                "Compression not available. Compile with --features compression",
            ))
        }
    } else {
        save_json(content, output_path).await
    }
}

/// Saves JSON data to file.
pub async fn save_json(content: &str, output_path: &Path) -> Result<()> {
    tokio::fs::write(output_path, content)
        .await
        .map_err(|e| InventoryError::Io {
            context: format!("Failed to write to {}", output_path.display()),
            source: e,
        })
}

/// Saves compressed JSON data.
#[cfg(feature = "compression")]
async fn save_compressed(content: &str, output_path: &Path) -> Result<()> {
    let compressed = zstd::encode_all(content.as_bytes(), 3).map_err(|e| InventoryError::Io {
        context: "Compression failed".to_string(),
        source: e,
    })?;

    tokio::fs::write(output_path, compressed)
        .await
        .map_err(|e| InventoryError::Io {
            context: format!(
                "Failed to write compressed file to {}",
                output_path.display()
            ),
            source: e,
        })
}
