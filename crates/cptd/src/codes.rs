//! CSV-backed CPT code database.
//!
//! Loads the spreadsheet-derived code table into keyed lookups and serves
//! substring search, ranked candidate retrieval, detail, and validation
//! queries.

use anyhow::{Context, Result};
use cpt_shared::{CodeDetails, CodeValidation};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// A single row from the code table
#[derive(Debug, Clone)]
struct CodeRow {
    code: String,
    description: String,
    category: String,
    subspecialty: String,
    related_codes: Vec<String>,
    key_indicator: bool,
    standard_charge: f64,
}

impl CodeRow {
    fn details(&self) -> CodeDetails {
        CodeDetails {
            code: self.code.clone(),
            description: self.description.clone(),
            category: self.category.clone(),
            subspecialty: self.subspecialty.clone(),
            related_codes: self.related_codes.clone(),
            key_indicator: self.key_indicator,
            standard_charge: self.standard_charge,
        }
    }
}

/// Load-time statistics, surfaced through the health endpoint
#[derive(Debug, Clone, Copy, Default)]
pub struct DatabaseStats {
    pub codes_loaded: usize,
    pub key_indicators_loaded: usize,
    pub standard_charges_loaded: usize,
}

/// In-memory CPT code database keyed by code
pub struct CodeDatabase {
    path: PathBuf,
    rows: Vec<CodeRow>,
    by_code: HashMap<String, usize>,
    categories: HashMap<String, Vec<String>>,
    subspecialties: HashMap<String, Vec<String>>,
    key_indicators: HashSet<String>,
}

impl CodeDatabase {
    /// Load the code table from a CSV file.
    ///
    /// Header matching is tolerant of the spreadsheet's naming drift:
    /// headers are lowercased with spaces collapsed to underscores before
    /// lookup, so "CPT Code" and "cpt_code" both work.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        info!("Loading CPT code table from {}", path.display());

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(&path)
            .with_context(|| format!("Failed to open code table {}", path.display()))?;

        let headers = reader
            .headers()
            .context("Failed to read code table headers")?
            .clone();
        let columns: HashMap<String, usize> = headers
            .iter()
            .enumerate()
            .map(|(idx, h)| (normalize_header(h), idx))
            .collect();

        let col = |names: &[&str]| -> Option<usize> {
            names.iter().find_map(|n| columns.get(*n).copied())
        };
        let code_col = col(&["cpt_code", "code"]);
        let desc_col = col(&["description"]);
        let category_col = col(&["category"]);
        let subspecialty_col = col(&["subspecialty"]);
        let related_col = col(&["related_codes"]);
        let key_col = col(&["key_indicator"]);
        let charge_col = col(&["standard_charge"]);

        let mut rows: Vec<CodeRow> = Vec::new();
        let mut by_code: HashMap<String, usize> = HashMap::new();

        for record in reader.records() {
            let record = record.context("Failed to read code table row")?;
            let field =
                |idx: Option<usize>| idx.and_then(|i| record.get(i)).unwrap_or("").trim();

            let code = normalize_code(field(code_col));
            if code.is_empty() {
                continue;
            }

            let standard_charge = match field(charge_col) {
                "" => 0.0,
                raw => parse_charge(raw).unwrap_or_else(|| {
                    warn!("Could not parse charge value '{}' for code {}", raw, code);
                    0.0
                }),
            };

            let row = CodeRow {
                description: field(desc_col).to_string(),
                category: field(category_col).to_string(),
                subspecialty: field(subspecialty_col).to_string(),
                related_codes: parse_related_codes(field(related_col)),
                key_indicator: parse_flag(field(key_col)),
                standard_charge,
                code: code.clone(),
            };

            // Duplicate codes: last row wins
            match by_code.get(&code) {
                Some(&idx) => rows[idx] = row,
                None => {
                    by_code.insert(code, rows.len());
                    rows.push(row);
                }
            }
        }

        let mut categories: HashMap<String, Vec<String>> = HashMap::new();
        let mut subspecialties: HashMap<String, Vec<String>> = HashMap::new();
        let mut key_indicators = HashSet::new();
        for row in &rows {
            if !row.category.is_empty() {
                categories
                    .entry(row.category.clone())
                    .or_default()
                    .push(row.code.clone());
            }
            if !row.subspecialty.is_empty() {
                subspecialties
                    .entry(row.subspecialty.clone())
                    .or_default()
                    .push(row.code.clone());
            }
            if row.key_indicator {
                key_indicators.insert(row.code.clone());
            }
        }

        let db = Self {
            path,
            rows,
            by_code,
            categories,
            subspecialties,
            key_indicators,
        };
        let stats = db.stats();
        info!(
            "Loaded {} CPT codes, {} key indicators, {} with standard charges",
            stats.codes_loaded, stats.key_indicators_loaded, stats.standard_charges_loaded
        );
        Ok(db)
    }

    /// Case-insensitive substring search across all fields, in file order
    pub fn search(&self, query: &str, limit: usize) -> Vec<CodeDetails> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        self.rows
            .iter()
            .filter(|row| {
                row.code.to_lowercase().contains(&needle)
                    || row.description.to_lowercase().contains(&needle)
                    || row.category.to_lowercase().contains(&needle)
                    || row.subspecialty.to_lowercase().contains(&needle)
            })
            .take(limit)
            .map(CodeRow::details)
            .collect()
    }

    /// Token-overlap ranking over descriptions for candidate retrieval.
    ///
    /// Scores each code by how many query tokens appear in its description,
    /// category, or subspecialty. Ties go to key-indicator codes, then to the
    /// higher standard charge.
    pub fn search_ranked(&self, query: &str, limit: usize) -> Vec<CodeDetails> {
        let tokens: Vec<String> = tokenize(query);
        if tokens.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<(usize, &CodeRow)> = self
            .rows
            .iter()
            .filter_map(|row| {
                let haystack = format!(
                    "{} {} {}",
                    row.description.to_lowercase(),
                    row.category.to_lowercase(),
                    row.subspecialty.to_lowercase()
                );
                let score = tokens.iter().filter(|t| haystack.contains(t.as_str())).count();
                (score > 0).then_some((score, row))
            })
            .collect();

        scored.sort_by(|(sa, a), (sb, b)| {
            sb.cmp(sa)
                .then_with(|| b.key_indicator.cmp(&a.key_indicator))
                .then_with(|| {
                    b.standard_charge
                        .partial_cmp(&a.standard_charge)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
        });

        scored
            .into_iter()
            .take(limit)
            .map(|(_, row)| row.details())
            .collect()
    }

    /// Full details for a code, if present
    pub fn details(&self, code: &str) -> Option<CodeDetails> {
        self.by_code
            .get(&normalize_code(code))
            .map(|&idx| self.rows[idx].details())
    }

    /// Validate that a code exists
    pub fn validate(&self, code: &str) -> CodeValidation {
        match self.details(code) {
            Some(details) => CodeValidation::valid(details.code, details.description),
            None => CodeValidation::invalid(normalize_code(code)),
        }
    }

    pub fn is_key_indicator(&self, code: &str) -> bool {
        self.key_indicators.contains(&normalize_code(code))
    }

    /// Standard charge for a code, 0.0 when absent
    pub fn standard_charge(&self, code: &str) -> f64 {
        self.details(code).map(|d| d.standard_charge).unwrap_or(0.0)
    }

    pub fn related_codes(&self, code: &str) -> Vec<String> {
        self.details(code).map(|d| d.related_codes).unwrap_or_default()
    }

    /// Codes in a category, empty when the category is unknown
    pub fn codes_in_category(&self, category: &str) -> &[String] {
        self.categories
            .get(category)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Codes in a subspecialty, empty when unknown
    pub fn codes_in_subspecialty(&self, subspecialty: &str) -> &[String] {
        self.subspecialties
            .get(subspecialty)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn stats(&self) -> DatabaseStats {
        DatabaseStats {
            codes_loaded: self.rows.len(),
            key_indicators_loaded: self.key_indicators.len(),
            standard_charges_loaded: self
                .rows
                .iter()
                .filter(|r| r.standard_charge > 0.0)
                .count(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn normalize_header(header: &str) -> String {
    header.trim().to_lowercase().replace([' ', '-'], "_")
}

/// Normalize a code cell: trim, and strip the ".0" a spreadsheet export
/// leaves on numeric cells.
fn normalize_code(raw: &str) -> String {
    let trimmed = raw.trim();
    trimmed.strip_suffix(".0").unwrap_or(trimmed).to_string()
}

/// Truthy spreadsheet flag: yes/y/true/t/1 in any case
fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_lowercase().as_str(),
        "yes" | "y" | "true" | "t" | "1"
    )
}

/// Charge cell: currency symbols and thousands separators tolerated
fn parse_charge(raw: &str) -> Option<f64> {
    raw.trim()
        .trim_start_matches('$')
        .replace(',', "")
        .parse::<f64>()
        .ok()
}

fn parse_related_codes(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(normalize_code)
        .filter(|c| !c.is_empty())
        .collect()
}

fn tokenize(query: &str) -> Vec<String> {
    query
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 2)
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const TEST_TABLE: &str = "\
cpt_code,description,category,subspecialty,related_codes,key_indicator,standard_charge
31231,\"Nasal endoscopy, diagnostic\",Nose,Rhinology,\"31233, 31235\",Yes,850.00
31233,Nasal endoscopy with maxillary sinusoscopy,Nose,Rhinology,31231,No,975.50
69436,\"Tympanostomy with tubes, general anesthesia\",Ear,Otology,69433,Yes,\"$2,150.00\"
42820,\"Tonsillectomy and adenoidectomy, under age 12\",Throat,,\"42821, 42825\",No,
30520,Septoplasty,Nose,Rhinology,30930,no,1800
";

    fn test_db() -> CodeDatabase {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(TEST_TABLE.as_bytes()).unwrap();
        CodeDatabase::load(file.path()).unwrap()
    }

    #[test]
    fn test_load_counts() {
        let db = test_db();
        let stats = db.stats();
        assert_eq!(stats.codes_loaded, 5);
        assert_eq!(stats.key_indicators_loaded, 2);
        assert_eq!(stats.standard_charges_loaded, 4);
    }

    #[test]
    fn test_details_and_related_codes() {
        let db = test_db();
        let details = db.details("31231").unwrap();
        assert_eq!(details.description, "Nasal endoscopy, diagnostic");
        assert_eq!(details.category, "Nose");
        assert_eq!(details.related_codes, vec!["31233", "31235"]);
        assert!(details.key_indicator);
    }

    #[test]
    fn test_charge_parsing_handles_currency_format() {
        let db = test_db();
        assert_eq!(db.standard_charge("69436"), 2150.0);
        assert_eq!(db.standard_charge("42820"), 0.0);
    }

    #[test]
    fn test_substring_search() {
        let db = test_db();
        let results = db.search("endoscopy", 10);
        assert_eq!(results.len(), 2);

        let results = db.search("ENDOSCOPY", 1);
        assert_eq!(results.len(), 1);

        assert!(db.search("cardiology", 10).is_empty());
    }

    #[test]
    fn test_ranked_search_prefers_key_indicators() {
        let db = test_db();
        let results = db.search_ranked("nasal endoscopy", 10);
        assert!(results.len() >= 2);
        // Both nasal endoscopy rows match both tokens; 31231 is the key
        // indicator and must rank first.
        assert_eq!(results[0].code, "31231");
    }

    #[test]
    fn test_validate() {
        let db = test_db();
        assert!(db.validate("30520").valid);
        let bad = db.validate("99999");
        assert!(!bad.valid);
        assert!(bad.error.unwrap().contains("99999"));
    }

    #[test]
    fn test_numeric_code_cell_is_normalized() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"cpt_code,description\n31231.0,Nasal endoscopy\n")
            .unwrap();
        let db = CodeDatabase::load(file.path()).unwrap();
        assert!(db.details("31231").is_some());
    }

    #[test]
    fn test_duplicate_code_last_row_wins() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"cpt_code,description\n31231,Old description\n31231,New description\n")
            .unwrap();
        let db = CodeDatabase::load(file.path()).unwrap();
        assert_eq!(db.len(), 1);
        assert_eq!(db.details("31231").unwrap().description, "New description");
    }

    #[test]
    fn test_header_variants() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"CPT Code,Description,Category\n42820,Tonsillectomy,Throat\n")
            .unwrap();
        let db = CodeDatabase::load(file.path()).unwrap();
        assert_eq!(db.details("42820").unwrap().category, "Throat");
    }

    #[test]
    fn test_category_and_subspecialty_lookups() {
        let db = test_db();
        let nose = db.codes_in_category("Nose");
        assert!(nose.contains(&"31231".to_string()));
        assert!(nose.contains(&"30520".to_string()));
        assert_eq!(db.codes_in_subspecialty("Otology"), &["69436".to_string()]);
        assert!(db.codes_in_category("Cardiology").is_empty());
    }

    #[test]
    fn test_empty_table_is_not_an_error() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"cpt_code,description\n").unwrap();
        let db = CodeDatabase::load(file.path()).unwrap();
        assert!(db.is_empty());
    }
}
