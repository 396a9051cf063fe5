//! One feed run: search, dedupe, append.
//!
//! API-side failures end the run early with an [`AbortReason`] and leave the
//! sheet's data rows untouched. Only store failures are returned as errors.

use crate::columns::{ensure_required_headers, REQUIRED_HEADERS, TITLE};
use crate::config::RunConfig;
use crate::error::{LitReviewError, Result};
use crate::fetch::{fetch_with_backoff, Transport};
use crate::rows::RowBuilder;
use crate::semanticscholar::{parse_search_response, SearchParams};
use crate::store::{CellRange, CellValue, Sheet, Workbook};
use chrono::{Local, NaiveDate};
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, info, warn};

/// Background applied to freshly appended rows
pub const HIGHLIGHT_COLOR: &str = "#E1F5FE";

/// Why a run stopped before appending anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    /// Every attempt failed before a status came back
    NoResponse,
    /// Final response was not 2xx
    HttpStatus { status: u16, body: String },
    /// Body was not JSON
    MalformedJson(String),
    /// JSON without a `data` array
    MissingDataArray,
    /// Everything returned was a duplicate, untitled or malformed
    NoNewRows,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::NoResponse => write!(f, "no response returned after retries"),
            AbortReason::HttpStatus { status, .. } => {
                write!(f, "non-2xx after retries: HTTP {}", status)
            }
            AbortReason::MalformedJson(e) => write!(f, "JSON parse error: {}", e),
            AbortReason::MissingDataArray => write!(f, "unexpected response shape (no data array)"),
            AbortReason::NoNewRows => write!(f, "no new rows to append"),
        }
    }
}

/// Outcome of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Items in the API response
    pub fetched: usize,
    pub appended: usize,
    /// First row written, when anything was
    pub start_row: Option<usize>,
    pub skipped_duplicates: usize,
    pub skipped_missing_title: usize,
    pub failed_items: usize,
    pub abort: Option<AbortReason>,
}

impl RunSummary {
    fn aborted(abort: AbortReason) -> Self {
        Self {
            abort: Some(abort),
            ..Default::default()
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.is_some()
    }
}

/// Feed runner for one configuration and transport.
pub struct Runner<T: Transport> {
    config: RunConfig,
    transport: T,
}

impl<T: Transport> Runner<T> {
    pub fn new(config: RunConfig, transport: T) -> Self {
        Self { config, transport }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Run against today's local date.
    pub async fn run<W: Workbook>(&self, workbook: &mut W) -> Result<RunSummary> {
        self.run_at(workbook, Local::now().date_naive()).await
    }

    /// Run with the publication window anchored at `today`.
    pub async fn run_at<W: Workbook>(
        &self,
        workbook: &mut W,
        today: NaiveDate,
    ) -> Result<RunSummary> {
        let config = &self.config;
        info!(
            keyword = %config.search_keyword,
            sheet = %config.sheet_name,
            "Starting Semantic Scholar fetch with backoff"
        );

        if !workbook.has_sheet(&config.sheet_name) {
            info!(sheet = %config.sheet_name, "Sheet not found, creating it");
        }
        let columns = {
            let sheet = workbook.sheet_or_insert(&config.sheet_name)?;
            ensure_required_headers(sheet, REQUIRED_HEADERS)?
        };
        workbook.flush()?;
        info!(columns = %columns, "Column map");

        let params = SearchParams::from_config(config, today);
        let url = params.url(&config.api_url);
        debug!(url = %url, "Search request");

        let Some(response) = fetch_with_backoff(
            &self.transport,
            &url,
            config.retry_count,
            config.backoff_factor_seconds,
        )
        .await
        else {
            warn!("No response returned after retries");
            return Ok(RunSummary::aborted(AbortReason::NoResponse));
        };

        info!(status = response.status, "Final HTTP status");
        if !response.is_success() {
            warn!(
                status = response.status,
                body = %response.body,
                "Aborting: non-2xx after retries"
            );
            return Ok(RunSummary::aborted(AbortReason::HttpStatus {
                status: response.status,
                body: response.body,
            }));
        }

        let page = match parse_search_response(&response.body) {
            Ok(page) => page,
            Err(LitReviewError::Json(e)) => {
                warn!(error = %e, "JSON parse error");
                return Ok(RunSummary::aborted(AbortReason::MalformedJson(e.to_string())));
            }
            Err(e) => {
                warn!(error = %e, "Unexpected response shape");
                return Ok(RunSummary::aborted(AbortReason::MissingDataArray));
            }
        };
        let fetched = page.data.len();
        info!(items = fetched, total = ?page.total, "API response items");

        let sheet = workbook.sheet_or_insert(&config.sheet_name)?;
        let existing_titles = load_existing_titles(&*sheet, columns.get(TITLE))?;
        info!(existing = existing_titles.len(), "Existing items loaded");

        let built =
            RowBuilder::new(&columns, &existing_titles, config.limit_per_run).build(page.data);
        let mut summary = RunSummary {
            fetched,
            skipped_duplicates: built.skipped_duplicates,
            skipped_missing_title: built.skipped_missing_title,
            failed_items: built.failed_items,
            ..Default::default()
        };

        let width = columns.width();
        if built.rows.is_empty() || width == 0 {
            info!("No new rows to append");
            summary.abort = Some(AbortReason::NoNewRows);
            return Ok(summary);
        }

        let start_row = sheet.last_row() + 1;
        let values: Vec<Vec<CellValue>> = built.rows.into_iter().map(|r| r.into_cells()).collect();
        let range = CellRange::new(start_row, 1, values.len(), width);

        sheet.set_values(range, &values)?;
        if let Err(e) = sheet.set_background(range, HIGHLIGHT_COLOR) {
            warn!(error = %e, "Failed to highlight appended rows");
        }
        workbook.flush()?;

        info!(rows = values.len(), start_row, "Appended new rows");
        summary.appended = values.len();
        summary.start_row = Some(start_row);
        Ok(summary)
    }
}

/// Titles in rows 2..=last_row of the title column, as written.
fn load_existing_titles<S: Sheet + ?Sized>(
    sheet: &S,
    title_column: Option<usize>,
) -> Result<HashSet<String>> {
    let last_row = sheet.last_row();
    let Some(column) = title_column.filter(|_| last_row > 1) else {
        return Ok(HashSet::new());
    };

    Ok(sheet
        .get_values(CellRange::new(2, column, last_row - 1, 1))?
        .into_iter()
        .flatten()
        .map(|cell| cell.to_string())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::tests::{Reply, ScriptedTransport};
    use crate::csv_store::CsvWorkbook;
    use crate::store::{Grid, MemoryWorkbook};
    use tempfile::TempDir;

    const PAGE: &str = r#"{
        "total": 4,
        "data": [
            {"paperId": "p1", "title": "Paper A", "publicationDate": "2026-09-30", "url": "https://s2.test/p1"},
            {"paperId": "p2", "title": "Paper B", "publicationDate": "2026-09-29", "abstract": "About B",
             "openAccessPdf": {"url": "https://arxiv.test/b.pdf"}, "url": "https://s2.test/p2",
             "authors": [{"name": "X"}, {"name": "Y"}]},
            {"paperId": "p3", "title": ""},
            {"paperId": "p4", "title": "Paper C", "url": "https://s2.test/p4"}
        ]
    }"#;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).expect("valid date")
    }

    fn config() -> RunConfig {
        RunConfig {
            sheet_name: "News".to_string(),
            backoff_factor_seconds: 0.1,
            retry_count: 3,
            api_url: "https://api.test/graph/v1/paper/search/bulk".to_string(),
            ..Default::default()
        }
    }

    fn news_sheet(workbook: &MemoryWorkbook) -> &Grid {
        workbook.sheet("News").expect("News sheet exists")
    }

    #[tokio::test(start_paused = true)]
    async fn test_appends_new_rows_after_existing_data() -> Result<()> {
        let mut workbook = MemoryWorkbook::new().with_sheet(Grid::from_rows(
            "News",
            [
                vec!["Date", "Title", "Authors", "Link", "Abstract"],
                vec!["2026-09-01", "Paper A", "", "", ""],
            ],
        ));
        let transport = ScriptedTransport::new(vec![Reply::Status(200, PAGE)]);
        let runner = Runner::new(config(), transport);

        let summary = runner.run_at(&mut workbook, today()).await?;

        assert_eq!(summary.fetched, 4);
        assert_eq!(summary.appended, 2);
        assert_eq!(summary.start_row, Some(3));
        assert_eq!(summary.skipped_duplicates, 1);
        assert_eq!(summary.skipped_missing_title, 1);
        assert!(!summary.is_aborted());

        let sheet = news_sheet(&workbook);
        assert_eq!(sheet.last_row(), 4);
        assert_eq!(sheet.value(3, 2), &CellValue::from("Paper B"));
        assert_eq!(sheet.value(3, 3), &CellValue::from("X, Y"));
        assert_eq!(sheet.value(3, 4), &CellValue::from("https://arxiv.test/b.pdf"));
        assert_eq!(sheet.value(3, 5), &CellValue::from("About B"));
        assert_eq!(sheet.value(4, 2), &CellValue::from("Paper C"));
        assert_eq!(sheet.value(4, 4), &CellValue::from("https://s2.test/p4"));
        assert_eq!(
            sheet.style(4, 5).and_then(|s| s.background.as_deref()),
            Some(HIGHLIGHT_COLOR)
        );
        assert!(sheet.style(2, 1).is_none());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_rows_after_one_data_row_land_in_rows_3_to_5() -> Result<()> {
        let mut workbook = MemoryWorkbook::new().with_sheet(Grid::from_rows(
            "News",
            [
                vec!["Date", "Title", "Authors", "Link", "Abstract"],
                vec!["2026-01-01", "Older paper", "Z", "", ""],
            ],
        ));
        let transport = ScriptedTransport::new(vec![Reply::Status(200, PAGE)]);
        let summary = Runner::new(config(), transport).run_at(&mut workbook, today()).await?;

        assert_eq!(summary.appended, 3);
        assert_eq!(summary.start_row, Some(3));
        let sheet = news_sheet(&workbook);
        assert_eq!(sheet.last_row(), 5);
        assert_eq!(sheet.value(3, 2), &CellValue::from("Paper A"));
        assert_eq!(sheet.value(5, 2), &CellValue::from("Paper C"));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_creates_sheet_and_headers() -> Result<()> {
        let mut workbook = MemoryWorkbook::new();
        let transport = ScriptedTransport::new(vec![Reply::Status(200, PAGE)]);
        let runner = Runner::new(config(), transport);

        let summary = runner.run_at(&mut workbook, today()).await?;
        assert_eq!(summary.appended, 3);
        assert_eq!(summary.start_row, Some(2));

        let sheet = news_sheet(&workbook);
        let headers: Vec<&str> = (1..=5).map(|c| sheet.value(1, c).as_str()).collect();
        assert_eq!(headers, vec!["Date", "Title", "Authors", "Abstract", "Link"]);
        assert_eq!(sheet.style(1, 1).map(|s| s.bold), Some(true));
        assert_eq!(sheet.value(2, 1), &CellValue::from("2026-09-30"));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_url() -> Result<()> {
        let mut workbook = MemoryWorkbook::new();
        let transport = ScriptedTransport::new(vec![Reply::Status(200, r#"{"data": []}"#)]);
        let runner = Runner::new(config(), transport);
        runner.run_at(&mut workbook, today()).await?;

        let urls = runner.transport.urls();
        assert_eq!(urls.len(), 1);
        assert!(urls[0]
            .starts_with("https://api.test/graph/v1/paper/search/bulk?query=LLM%20Safety&"));
        assert!(urls[0].contains("publicationDateOrYear=2025-12%3A2026-10%3A"));
        assert!(urls[0].ends_with("&limit=15&openAccessPdf"));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_run_is_idempotent() -> Result<()> {
        let mut workbook = MemoryWorkbook::new();
        let first = Runner::new(config(), ScriptedTransport::new(vec![Reply::Status(200, PAGE)]))
            .run_at(&mut workbook, today())
            .await?;
        assert_eq!(first.appended, 3);

        let second = Runner::new(config(), ScriptedTransport::new(vec![Reply::Status(200, PAGE)]))
            .run_at(&mut workbook, today())
            .await?;
        assert_eq!(second.appended, 0);
        assert_eq!(second.skipped_duplicates, 3);
        assert_eq!(second.abort, Some(AbortReason::NoNewRows));
        assert_eq!(news_sheet(&workbook).last_row(), 4);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_limit_caps_appended_rows() -> Result<()> {
        let mut workbook = MemoryWorkbook::new();
        let config = RunConfig {
            limit_per_run: 2,
            ..config()
        };
        let summary = Runner::new(config, ScriptedTransport::new(vec![Reply::Status(200, PAGE)]))
            .run_at(&mut workbook, today())
            .await?;
        assert_eq!(summary.appended, 2);
        assert_eq!(news_sheet(&workbook).last_row(), 3);
        Ok(())
    }

    async fn run_aborting(reply: Reply) -> Result<(RunSummary, MemoryWorkbook, usize)> {
        let mut workbook = MemoryWorkbook::new().with_sheet(Grid::from_rows(
            "News",
            [
                vec!["Date", "Title", "Authors", "Abstract", "Link"],
                vec!["2026-01-01", "Kept", "", "", ""],
            ],
        ));
        let runner = Runner::new(config(), ScriptedTransport::new(vec![reply]));
        let summary = runner.run_at(&mut workbook, today()).await?;
        Ok((summary, workbook, runner.transport.calls()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_without_response() -> Result<()> {
        let (summary, workbook, calls) = run_aborting(Reply::Fail).await?;
        assert_eq!(summary.abort, Some(AbortReason::NoResponse));
        assert_eq!(calls, 3);
        assert_eq!(news_sheet(&workbook).last_row(), 2);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_on_error_status() -> Result<()> {
        let (summary, workbook, calls) = run_aborting(Reply::Status(403, "forbidden")).await?;
        assert_eq!(
            summary.abort,
            Some(AbortReason::HttpStatus {
                status: 403,
                body: "forbidden".to_string()
            })
        );
        assert_eq!(calls, 1);
        assert_eq!(news_sheet(&workbook).last_row(), 2);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_on_malformed_payloads() -> Result<()> {
        let (summary, workbook, _) = run_aborting(Reply::Status(200, "<html>oops</html>")).await?;
        assert!(matches!(summary.abort, Some(AbortReason::MalformedJson(_))));
        assert_eq!(news_sheet(&workbook).last_row(), 2);

        let (summary, _, _) = run_aborting(Reply::Status(200, r#"{"total": 3}"#)).await?;
        assert_eq!(summary.abort, Some(AbortReason::MissingDataArray));
        Ok(())
    }

    #[test]
    fn test_existing_titles_require_data_and_title_column() -> Result<()> {
        let headers_only = Grid::from_rows("News", [vec!["Title"]]);
        assert!(load_existing_titles(&headers_only, Some(1))?.is_empty());

        let with_data =
            Grid::from_rows("News", [vec!["Date", "Title"], vec!["", "A "], vec!["x", ""]]);
        assert!(load_existing_titles(&with_data, None)?.is_empty());

        let titles = load_existing_titles(&with_data, Some(2))?;
        assert!(titles.contains("A "));
        assert!(titles.contains(""));
        assert_eq!(titles.len(), 2);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreadable_sheet_fails_the_run() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("News.csv");
        std::fs::write(&path, b"Date,Title\n\xff\xfe,x\n")?;

        let mut workbook = CsvWorkbook::open(dir.path())?;
        let runner = Runner::new(config(), ScriptedTransport::new(vec![Reply::Status(200, PAGE)]));
        let result = runner.run_at(&mut workbook, today()).await;

        assert!(matches!(result, Err(LitReviewError::Csv(_))));
        assert_eq!(runner.transport.calls(), 0);
        assert_eq!(std::fs::read(&path)?, b"Date,Title\n\xff\xfe,x\n");
        Ok(())
    }
}
