//! Flat export rows: processed automotive results plus passthrough rows.

use serde::{Deserialize, Serialize};

use fitscout_shared::{Catalog, EnrichedResult, PartRecord};

/// Makes written for parts categorized as tools.
pub const TOOL_MAKES: &str = "N/A (Tool)";

/// Makes written for parts that could not be categorized.
pub const UNKNOWN_MAKES: &str = "UNKNOWN_CATEGORY";

/// Source written for rows that were never looked up.
pub const PASSTHROUGH_SOURCE: &str = "N/A";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartCategory {
    Automotive,
    Tool,
    Unknown,
}

/// One exported line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRow {
    pub item_number: String,
    pub description: String,
    pub quantity: u32,
    pub unit_price: f64,
    pub extended_price: f64,
    pub part_number: String,
    pub category: PartCategory,
    pub makes: String,
    pub source: String,
}

impl ExportRow {
    fn from_part(part: &PartRecord, category: PartCategory, makes: &str, source: &str) -> Self {
        Self {
            item_number: part.item_number.clone(),
            description: part.description.clone(),
            quantity: part.quantity,
            unit_price: part.unit_price,
            extended_price: part.extended_price,
            part_number: part.part_number.clone(),
            category,
            makes: makes.to_string(),
            source: source.to_string(),
        }
    }
}

impl From<&EnrichedResult> for ExportRow {
    fn from(result: &EnrichedResult) -> Self {
        Self::from_part(
            &result.part,
            PartCategory::Automotive,
            &result.makes.to_string(),
            &result.source,
        )
    }
}

/// Processed results in processing order, then tools, then unknown parts.
pub fn build_export(results: &[EnrichedResult], catalog: &Catalog) -> Vec<ExportRow> {
    let mut rows: Vec<ExportRow> = results.iter().map(ExportRow::from).collect();
    rows.extend(
        catalog
            .tools
            .iter()
            .map(|p| ExportRow::from_part(p, PartCategory::Tool, TOOL_MAKES, PASSTHROUGH_SOURCE)),
    );
    rows.extend(catalog.unknown.iter().map(|p| {
        ExportRow::from_part(p, PartCategory::Unknown, UNKNOWN_MAKES, PASSTHROUGH_SOURCE)
    }));
    rows
}
