//! Category jobs: many term lists searched as few queries, rows tagged afterwards
//!
//! Categories are packed into search queries without exceeding the provider's
//! positive-clause limit, all results land in `<name>_tmp.csv`, and the final
//! `<name>.csv` gets `category_number` / `category_name` columns naming the
//! first category with a term found in the row.

use std::ops::Range;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::NaiveDateTime;
use indicatif::ProgressBar;
use powertrack_core::{CancelToken, RowCodec};
use serde::Deserialize;

use crate::client::PowerTrack;
use crate::search::{SearchJob, SearchSummary};

/// Provider allows 30 positive clauses; 2 are taken by the geo filter
pub const SEARCH_API_MAX_POSITIVE_CLAUSES: usize = 28;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Category {
    pub name: String,
    #[serde(default)]
    pub terms: Vec<String>,
}

impl Category {
    pub fn new(name: &str, terms: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            terms: terms.iter().map(|t| t.to_string()).collect(),
        }
    }

    pub fn query(&self) -> String {
        self.terms.join(" OR ")
    }
}

#[derive(Debug, Deserialize)]
struct CategoryFile {
    name: String,
    #[serde(default, rename = "category")]
    categories: Vec<Category>,
}

#[derive(Debug, Clone)]
pub struct CategorySummary {
    pub queries: usize,
    pub search: SearchSummary,
    /// Data rows in the tagged file
    pub tagged: u64,
    pub output: PathBuf,
}

/// Named set of categories, numbered from 1 in insertion order
#[derive(Debug, Clone)]
pub struct CategoryJob {
    pub name: String,
    categories: Vec<Category>,
}

impl CategoryJob {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            categories: Vec::new(),
        }
    }

    /// Parse a category file:
    ///
    /// ```toml
    /// name = "transport"
    ///
    /// [[category]]
    /// name = "bike"
    /// terms = ["bici", "bicicleta"]
    /// ```
    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let file: CategoryFile = toml::from_str(content).context("Invalid category file")?;
        let mut job = Self::new(&file.name);
        for category in file.categories {
            job.add_category(category);
        }
        Ok(job)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("In {}", path.display()))
    }

    pub fn add_category(&mut self, category: Category) {
        self.categories.push(category);
    }

    pub fn create_category(&mut self, name: &str, terms: &[&str]) -> &Category {
        self.categories.push(Category::new(name, terms));
        &self.categories[self.categories.len() - 1]
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    /// 1-based number of the category called `name`
    pub fn category_number(&self, name: &str) -> Option<usize> {
        self.categories
            .iter()
            .position(|c| c.name == name)
            .map(|i| i + 1)
    }

    /// Pack categories into as few queries as the clause limit allows.
    ///
    /// A category is never split across queries, so one with more terms than
    /// the limit gets a query of its own.
    pub fn queries(&self) -> Vec<String> {
        let mut queries = Vec::new();
        let mut current: Vec<String> = Vec::new();
        let mut clauses = 0;

        for category in self.categories.iter().filter(|c| !c.terms.is_empty()) {
            let terms = category.terms.len();
            if clauses + terms > SEARCH_API_MAX_POSITIVE_CLAUSES && !current.is_empty() {
                queries.push(current.join(" OR "));
                current.clear();
                clauses = 0;
            }
            if terms > SEARCH_API_MAX_POSITIVE_CLAUSES {
                log::warn!(
                    "Category '{}' has {terms} terms, over the {SEARCH_API_MAX_POSITIVE_CLAUSES} clause limit",
                    category.name
                );
            }
            current.push(category.query());
            clauses += terms;
        }
        if !current.is_empty() {
            queries.push(current.join(" OR "));
        }
        queries
    }

    /// First category with a term contained in `text`, case-insensitive
    pub fn find_category(&self, text: &str) -> Option<(usize, &str)> {
        let text = text.to_lowercase();
        self.categories.iter().enumerate().find_map(|(i, c)| {
            c.terms
                .iter()
                .any(|term| text.contains(&term.to_lowercase()))
                .then_some((i + 1, c.name.as_str()))
        })
    }

    /// Copy `input` to `output` with `category_number,category_name` appended
    pub fn tag_file(&self, input: &Path, output: &Path) -> anyhow::Result<u64> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(input)
            .with_context(|| format!("Cannot read {}", input.display()))?;
        let mut writer = csv::Writer::from_path(output)
            .with_context(|| format!("Cannot create {}", output.display()))?;

        let mut tagged = 0u64;
        for (i, record) in reader.records().enumerate() {
            let mut record = record.with_context(|| format!("Bad CSV in {}", input.display()))?;
            if i == 0 {
                record.push_field("category_number");
                record.push_field("category_name");
            } else {
                let text = record.iter().collect::<Vec<_>>().join(",");
                match self.find_category(&text) {
                    Some((number, name)) => {
                        record.push_field(&number.to_string());
                        record.push_field(name);
                    }
                    None => {
                        record.push_field("");
                        record.push_field("");
                    }
                }
                tagged += 1;
            }
            writer.write_record(&record)?;
        }
        writer
            .flush()
            .with_context(|| format!("Cannot flush {}", output.display()))?;
        Ok(tagged)
    }

    /// Search every query over `window` into `<name>_tmp.csv`, then tag into `<name>.csv`
    pub fn run(
        &self,
        pt: &PowerTrack,
        codec: &dyn RowCodec,
        folder: &Path,
        window: Range<NaiveDateTime>,
        progress: &ProgressBar,
        cancel: &CancelToken,
    ) -> anyhow::Result<CategorySummary> {
        let queries = self.queries();
        anyhow::ensure!(!queries.is_empty(), "Category job '{}' has no terms", self.name);
        log::info!(
            "{}: {} categories in {} queries",
            self.name,
            self.categories.len(),
            queries.len()
        );

        let tmp_title = format!("{}_tmp", self.name);
        let mut search = SearchSummary::default();
        for (i, query) in queries.iter().enumerate() {
            if cancel.is_cancelled() {
                search.interrupted = true;
                break;
            }
            log::info!("Query {}/{}", i + 1, queries.len());
            let job = SearchJob::new(&tmp_title, window.start, window.end, query);
            let s = job.export(pt, codec, folder, i > 0, progress, cancel)?;
            search.pages += s.pages;
            search.results += s.results;
            search.rows_written += s.rows_written;
            search.interrupted |= s.interrupted;
        }

        let tmp = folder.join(format!("{tmp_title}.csv"));
        let output = folder.join(format!("{}.csv", self.name));
        let tagged = self.tag_file(&tmp, &output)?;
        log::info!("{}: {tagged} rows tagged into {}", self.name, output.display());

        Ok(CategorySummary {
            queries: queries.len(),
            search,
            tagged,
            output,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terms(prefix: &str, n: usize) -> Vec<String> {
        (0..n).map(|i| format!("{prefix}{i}")).collect()
    }

    fn job_with(sizes: &[usize]) -> CategoryJob {
        let mut job = CategoryJob::new("j");
        for (i, &n) in sizes.iter().enumerate() {
            job.add_category(Category {
                name: format!("c{i}"),
                terms: terms(&format!("c{i}t"), n),
            });
        }
        job
    }

    fn clause_count(query: &str) -> usize {
        query.split(" OR ").count()
    }

    #[test]
    fn category_query_joins_terms() {
        let c = Category::new("bike", &["bici", "bicicleta"]);
        assert_eq!(c.query(), "bici OR bicicleta");
    }

    #[test]
    fn numbered_from_one() {
        let mut job = CategoryJob::new("j");
        job.create_category("a", &["x"]);
        let b = job.create_category("b", &["y"]);
        assert_eq!(b.name, "b");
        assert_eq!(job.category_number("a"), Some(1));
        assert_eq!(job.category_number("b"), Some(2));
        assert_eq!(job.category_number("c"), None);
    }

    #[test]
    fn small_categories_share_a_query() {
        let job = job_with(&[3, 4, 5]);
        let queries = job.queries();
        assert_eq!(queries.len(), 1);
        assert_eq!(clause_count(&queries[0]), 12);
    }

    #[test]
    fn split_at_clause_limit() {
        let job = job_with(&[20, 8, 1]);
        let queries = job.queries();
        assert_eq!(queries.len(), 2);
        assert_eq!(clause_count(&queries[0]), 28);
        assert_eq!(clause_count(&queries[1]), 1);
    }

    #[test]
    fn no_query_over_limit_and_none_empty() {
        let job = job_with(&[10, 10, 10, 10, 27, 1, 28]);
        let queries = job.queries();
        for q in &queries {
            assert!(!q.is_empty());
            assert!(clause_count(q) <= SEARCH_API_MAX_POSITIVE_CLAUSES, "{q}");
        }
        let total: usize = queries.iter().map(|q| clause_count(q)).sum();
        assert_eq!(total, 96);
        assert_eq!(queries.len(), 4);
    }

    #[test]
    fn oversized_first_category_gets_own_query() {
        let job = job_with(&[30, 2]);
        let queries = job.queries();
        assert_eq!(queries.len(), 2);
        assert_eq!(clause_count(&queries[0]), 30);
    }

    #[test]
    fn empty_job_has_no_queries() {
        assert!(CategoryJob::new("j").queries().is_empty());
        assert!(job_with(&[0, 0]).queries().is_empty());
    }

    #[test]
    fn first_matching_category_wins() {
        let mut job = CategoryJob::new("j");
        job.create_category("bike", &["Bici"]);
        job.create_category("metro", &["metro", "bici"]);
        assert_eq!(job.find_category("Voy en BICI al metro"), Some((1, "bike")));
        assert_eq!(job.find_category("line 5 del metro"), Some((2, "metro")));
        assert_eq!(job.find_category("a pie"), None);
    }

    #[test]
    fn parse_category_file() {
        let job = CategoryJob::from_toml(
            r#"
            name = "transport"

            [[category]]
            name = "bike"
            terms = ["bici", "bicicleta"]

            [[category]]
            name = "metro"
            terms = ["metro"]
            "#,
        )
        .unwrap();
        assert_eq!(job.name, "transport");
        assert_eq!(job.categories().len(), 2);
        assert_eq!(job.category_number("metro"), Some(2));
        assert_eq!(job.queries(), vec!["bici OR bicicleta OR metro"]);
    }

    #[test]
    fn tag_file_appends_columns() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("t_tmp.csv");
        let output = dir.path().join("t.csv");
        std::fs::write(
            &input,
            "id,body\n1,\"cojo la bici, luego\"\n2,nada\n3,METRO lleno\n",
        )
        .unwrap();

        let mut job = CategoryJob::new("t");
        job.create_category("bike", &["bici"]);
        job.create_category("metro", &["metro"]);
        assert_eq!(job.tag_file(&input, &output).unwrap(), 3);

        let mut reader = csv::Reader::from_path(&output).unwrap();
        let header: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
        assert_eq!(header, vec!["id", "body", "category_number", "category_name"]);
        let rows: Vec<Vec<String>> = reader
            .records()
            .map(|r| r.unwrap().iter().map(String::from).collect())
            .collect();
        assert_eq!(rows[0], vec!["1", "cojo la bici, luego", "1", "bike"]);
        assert_eq!(rows[1], vec!["2", "nada", "", ""]);
        assert_eq!(rows[2], vec!["3", "METRO lleno", "2", "metro"]);
    }

    #[test]
    fn tag_header_only_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.csv");
        let output = dir.path().join("out.csv");
        std::fs::write(&input, "id,body\n").unwrap();
        let job = job_with(&[1]);
        assert_eq!(job.tag_file(&input, &output).unwrap(), 0);
        let content = std::fs::read_to_string(&output).unwrap();
        assert_eq!(content, "id,body,category_number,category_name\n");
    }
}
