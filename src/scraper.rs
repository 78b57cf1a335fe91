use std::time::Duration;

use reqwest::blocking::Client;
use serde_json::Value;

use crate::parser::{extract_filter_options, parse_event_detail, parse_events_table};
use crate::types::{FilterField, FilterSet, GridPage, Record, ScrapeResult};
use crate::{BASE_URL, EVENT_DETAIL_PATH, EVENTS_GRID_PATH, EVENTS_PATH};

const TIMEOUT_SECS: u64 = 40;
const GRID_PAGE_SIZE: u32 = 100;
// The portal rejects non-browser user agents.
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/121.0 Safari/537.36";

#[derive(Debug, thiserror::Error)]
pub enum ScraperError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("Unexpected grid response: {0}")]
    UnexpectedResponse(String),
}

/// Scraper for the public events module.
///
/// Owns the one cookie-holding session the backend's filter priming is tied
/// to. All requests go out sequentially on this session; sharing it across
/// concurrent scrapes would mix up the server-side filter context.
#[derive(Debug, Clone)]
pub struct WebScraper {
    client: Client,
    base_url: String,
}

impl WebScraper {
    pub fn new() -> Result<Self, ScraperError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .cookie_store(true)
            .build()?;

        Ok(Self {
            client,
            base_url: BASE_URL.to_string(),
        })
    }

    /// Fetches the listing page and returns the filter fields its form offers.
    pub fn fetch_filter_options(&self) -> Result<Vec<FilterField>, ScraperError> {
        let html = self.fetch_events_page(&FilterSet::new())?;
        Ok(extract_filter_options(&html))
    }

    /// Runs the whole pipeline: paginate the grid (falling back to the
    /// rendered HTML table if any page fails), then optionally enrich each
    /// row with its detail page.
    ///
    /// `max_details` of `None` or `Some(0)` means no cap.
    pub fn scrape_events(
        &self,
        filters: &FilterSet,
        include_details: bool,
        max_details: Option<usize>,
    ) -> Result<ScrapeResult, ScraperError> {
        let summary = match self.fetch_all_grid_rows(filters) {
            Ok(rows) => rows,
            Err(e) => {
                log::warn!("Grid pagination failed ({e}); falling back to the rendered table");
                let html = self.fetch_events_page(filters)?;
                parse_events_table(&html, &self.base_url)
            }
        };

        if !include_details || summary.is_empty() {
            return Ok(ScrapeResult {
                summary,
                details: Vec::new(),
            });
        }

        let links = collect_detail_links(&summary, max_details);
        log::info!("Fetching {} detail page(s)...", links.len());

        let mut details = Vec::with_capacity(links.len());
        for (idx, url) in links.iter().enumerate() {
            let indice = (idx + 1).to_string();
            match self.fetch_detail_page(url) {
                Ok(html) => {
                    let mut record = parse_event_detail(&html);
                    record.insert("detalle_url".to_string(), Value::String(url.clone()));
                    record.insert("indice".to_string(), Value::String(indice));
                    details.push(record);
                }
                Err(e) => {
                    log::warn!("Detail fetch failed for {url}: {e}");
                    let mut record = Record::new();
                    record.insert("detalle_url".to_string(), Value::String(url.clone()));
                    record.insert("error".to_string(), Value::String(e.to_string()));
                    record.insert("indice".to_string(), Value::String(indice));
                    details.push(record);
                }
            }
        }

        Ok(ScrapeResult { summary, details })
    }

    /// Grid path: page 1 declares the page count, the rest are fetched in
    /// order. Any failure bubbles up so the caller can switch to the HTML
    /// fallback — never a partial accumulation.
    fn fetch_all_grid_rows(&self, filters: &FilterSet) -> Result<Vec<Record>, ScraperError> {
        let first = self.fetch_grid_page(filters, 1)?;
        let total_pages = first.total;
        let mut rows = first.rows;

        for page in 2..=total_pages {
            let page_data = self.fetch_grid_page(filters, page)?;
            rows.extend(page_data.rows);
        }
        log::info!(
            "Fetched {} grid row(s) across {} page(s)",
            rows.len(),
            total_pages.max(1)
        );

        apply_detail_urls(&mut rows, &self.base_url);
        Ok(rows)
    }

    /// Primes the session with the filters, then requests one grid page.
    ///
    /// The backend applies filters from the preceding GET to the events
    /// module, not from the grid POST itself.
    fn fetch_grid_page(&self, filters: &FilterSet, page: u32) -> Result<GridPage, ScraperError> {
        self.client
            .get(format!("{}{}", self.base_url, EVENTS_PATH))
            .query(filters)
            .send()?
            .error_for_status()?;

        let form: [(&str, String); 6] = [
            ("_search", "false".to_string()),
            ("nd", "0".to_string()),
            ("rows", GRID_PAGE_SIZE.to_string()),
            ("page", page.to_string()),
            ("sidx", String::new()),
            ("sord", "asc".to_string()),
        ];
        let body: Value = self
            .client
            .post(format!("{}{}", self.base_url, EVENTS_GRID_PATH))
            .form(&form)
            .send()?
            .error_for_status()?
            .json()?;

        parse_grid_page(body)
    }

    fn fetch_events_page(&self, filters: &FilterSet) -> Result<String, ScraperError> {
        Ok(self
            .client
            .get(format!("{}{}", self.base_url, EVENTS_PATH))
            .query(filters)
            .send()?
            .error_for_status()?
            .text()?)
    }

    fn fetch_detail_page(&self, url: &str) -> Result<String, ScraperError> {
        Ok(self
            .client
            .get(url)
            .send()?
            .error_for_status()?
            .text()?)
    }
}

/// Decodes a grid response body, rejecting anything that is not an object
/// with an integer-like `total`.
fn parse_grid_page(body: Value) -> Result<GridPage, ScraperError> {
    let Value::Object(map) = body else {
        return Err(ScraperError::UnexpectedResponse(
            "body is not a JSON object".to_string(),
        ));
    };

    let total = match map.get("total") {
        None | Some(Value::Null) => 0,
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().map(|f| f.max(0.0) as u64))
            .unwrap_or(0)
            .min(u64::from(u32::MAX)) as u32,
        Some(Value::String(s)) => s.trim().parse::<u32>().map_err(|_| {
            ScraperError::UnexpectedResponse(format!("non-numeric total: {s:?}"))
        })?,
        Some(other) => {
            return Err(ScraperError::UnexpectedResponse(format!(
                "total has unexpected type: {other}"
            )));
        }
    };

    let rows = match map.get("rows") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_object().cloned())
            .collect(),
        _ => Vec::new(),
    };

    Ok(GridPage { total, rows })
}

/// Grid rows don't ship a detail link; rows that carry an `EventoId` get one
/// synthesized from the detail URL template. Rows without the identifier
/// keep whatever `detalle_url` they already have, or an empty one.
fn apply_detail_urls(rows: &mut [Record], base_url: &str) {
    for row in rows.iter_mut() {
        let url = match row.get("EventoId") {
            Some(Value::String(s)) if !s.trim().is_empty() => {
                Some(format!("{base_url}{EVENT_DETAIL_PATH}/{}", s.trim()))
            }
            Some(Value::Number(n)) => Some(format!("{base_url}{EVENT_DETAIL_PATH}/{n}")),
            _ => None,
        };
        match url {
            Some(url) => {
                row.insert("detalle_url".to_string(), Value::String(url));
            }
            None => {
                row.entry("detalle_url")
                    .or_insert(Value::String(String::new()));
            }
        }
    }
}

/// Non-empty detail links in row order, truncated to `max_details` when that
/// is a positive cap.
fn collect_detail_links(rows: &[Record], max_details: Option<usize>) -> Vec<String> {
    let mut links: Vec<String> = rows
        .iter()
        .filter_map(|row| row.get("detalle_url"))
        .filter_map(Value::as_str)
        .filter(|url| !url.is_empty())
        .map(str::to_string)
        .collect();

    if let Some(limit) = max_details.filter(|&limit| limit > 0) {
        links.truncate(limit);
    }
    links
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().expect("test row must be an object")
    }

    #[test]
    fn test_parse_grid_page() {
        let body = json!({
            "total": 2,
            "page": 1,
            "rows": [
                {"EventoId": "5", "Nombre": "Feria A"},
                {"EventoId": "6", "Nombre": "Feria B"},
            ],
        });

        let page = parse_grid_page(body).unwrap();

        assert_eq!(page.total, 2);
        assert_eq!(page.rows.len(), 2);
        assert_eq!(page.rows[0]["Nombre"], "Feria A");
    }

    #[test]
    fn test_parse_grid_page_string_total() {
        let page = parse_grid_page(json!({"total": " 3 ", "rows": []})).unwrap();
        assert_eq!(page.total, 3);
    }

    #[test]
    fn test_parse_grid_page_missing_fields() {
        let page = parse_grid_page(json!({})).unwrap();
        assert_eq!(page.total, 0);
        assert!(page.rows.is_empty());
    }

    #[test]
    fn test_parse_grid_page_rejects_non_object() {
        assert!(matches!(
            parse_grid_page(json!([1, 2, 3])),
            Err(ScraperError::UnexpectedResponse(_))
        ));
        assert!(matches!(
            parse_grid_page(json!("<html>error</html>")),
            Err(ScraperError::UnexpectedResponse(_))
        ));
    }

    #[test]
    fn test_parse_grid_page_rejects_non_numeric_total() {
        assert!(matches!(
            parse_grid_page(json!({"total": "muchas", "rows": []})),
            Err(ScraperError::UnexpectedResponse(_))
        ));
    }

    #[test]
    fn test_parse_grid_page_skips_non_object_rows() {
        let page =
            parse_grid_page(json!({"total": 1, "rows": [{"EventoId": "1"}, "basura", 7]})).unwrap();
        assert_eq!(page.rows.len(), 1);
    }

    #[test]
    fn test_apply_detail_urls() {
        let mut rows = vec![
            record(json!({"EventoId": "5", "Nombre": "Feria A"})),
            record(json!({"EventoId": 6, "Nombre": "Feria B"})),
            record(json!({"Nombre": "Sin id", "detalle_url": "https://x.y/z"})),
            record(json!({"Nombre": "Sin nada"})),
        ];

        apply_detail_urls(&mut rows, BASE_URL);

        assert_eq!(
            rows[0]["detalle_url"],
            format!("{BASE_URL}{EVENT_DETAIL_PATH}/5")
        );
        assert_eq!(
            rows[1]["detalle_url"],
            format!("{BASE_URL}{EVENT_DETAIL_PATH}/6")
        );
        assert_eq!(rows[2]["detalle_url"], "https://x.y/z");
        assert_eq!(rows[3]["detalle_url"], "");
    }

    #[test]
    fn test_collect_detail_links_order_and_cap() {
        let rows = vec![
            record(json!({"detalle_url": "https://a"})),
            record(json!({"detalle_url": ""})),
            record(json!({"Nombre": "sin enlace"})),
            record(json!({"detalle_url": "https://b"})),
            record(json!({"detalle_url": "https://c"})),
        ];

        assert_eq!(
            collect_detail_links(&rows, None),
            vec!["https://a", "https://b", "https://c"]
        );
        assert_eq!(
            collect_detail_links(&rows, Some(2)),
            vec!["https://a", "https://b"]
        );
        // Zero means "no cap", not "nothing".
        assert_eq!(collect_detail_links(&rows, Some(0)).len(), 3);
    }

    #[test]
    fn test_two_page_accumulation_builds_template_urls() {
        let page1 =
            parse_grid_page(json!({"total": 2, "rows": [{"EventoId": "5", "Nombre": "Feria A"}]}))
                .unwrap();
        let page2 =
            parse_grid_page(json!({"total": 2, "rows": [{"EventoId": "6", "Nombre": "Feria B"}]}))
                .unwrap();

        let mut rows = page1.rows;
        rows.extend(page2.rows);
        apply_detail_urls(&mut rows, BASE_URL);

        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows[0]["detalle_url"],
            format!("{BASE_URL}{EVENT_DETAIL_PATH}/5")
        );
        assert_eq!(
            rows[1]["detalle_url"],
            format!("{BASE_URL}{EVENT_DETAIL_PATH}/6")
        );

        let links = collect_detail_links(&rows, None);
        assert_eq!(links.len(), 2);
    }
}
