use scraper::{ElementRef, Html, Node, Selector};
use serde_json::Value;

use crate::types::{FilterField, FilterOption, Record};

fn elem_text(element: ElementRef) -> String {
    normalize_whitespace(&element.text().collect::<Vec<_>>().join(" "))
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn absolutize(base_url: &str, href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        href.to_string()
    } else if href.starts_with('/') {
        format!("{}{}", base_url.trim_end_matches('/'), href)
    } else {
        format!("{}/{}", base_url.trim_end_matches('/'), href)
    }
}

/// Collects the options of every `<select>` in the page's filter form.
///
/// Selects are keyed by `name`, falling back to `id`; controls with neither
/// are skipped. Option labels fall back to the value when empty and vice
/// versa. A page without a form yields an empty list, never an error.
pub fn extract_filter_options(html: &str) -> Vec<FilterField> {
    let document = Html::parse_document(html);
    let form_sel = Selector::parse("form").unwrap();
    let select_sel = Selector::parse("select").unwrap();
    let option_sel = Selector::parse("option").unwrap();

    let Some(form) = document.select(&form_sel).next() else {
        return Vec::new();
    };

    let mut fields = Vec::new();
    for select in form.select(&select_sel) {
        let Some(name) = select
            .value()
            .attr("name")
            .or_else(|| select.value().attr("id"))
        else {
            continue;
        };

        let mut options = Vec::new();
        for option in select.select(&option_sel) {
            let value = option.value().attr("value").unwrap_or("").trim().to_string();
            let label = elem_text(option);
            if value.is_empty() && label.is_empty() {
                continue;
            }
            options.push(FilterOption {
                label: if label.is_empty() { value.clone() } else { label },
                value,
            });
        }

        fields.push(FilterField {
            name: name.to_string(),
            options,
        });
    }

    fields
}

/// Picks the results table: the first one whose headers mention "evento",
/// otherwise the first table on the page.
fn find_results_table(document: &Html) -> Option<ElementRef<'_>> {
    let table_sel = Selector::parse("table").unwrap();
    let th_sel = Selector::parse("th").unwrap();

    let tables: Vec<ElementRef<'_>> = document.select(&table_sel).collect();
    tables
        .iter()
        .copied()
        .find(|table| {
            table
                .select(&th_sel)
                .any(|th| elem_text(th).to_lowercase().contains("evento"))
        })
        .or_else(|| tables.first().copied())
}

/// Parses the server-rendered events table into rows.
///
/// This is the fallback path for when the grid endpoint misbehaves. Header
/// cells define column names; cells past the header count are named
/// positionally (`col_N`). The first link in a row becomes an absolute
/// `detalle_url`, empty when the row has none. A page without tables yields
/// an empty list.
pub fn parse_events_table(html: &str, base_url: &str) -> Vec<Record> {
    let document = Html::parse_document(html);
    let Some(table) = find_results_table(&document) else {
        return Vec::new();
    };

    let thead_th_sel = Selector::parse("thead th").unwrap();
    let th_sel = Selector::parse("th").unwrap();
    let tbody_tr_sel = Selector::parse("tbody tr").unwrap();
    let tr_sel = Selector::parse("tr").unwrap();
    let td_sel = Selector::parse("td").unwrap();
    let link_sel = Selector::parse("a[href]").unwrap();

    let mut headers: Vec<String> = table.select(&thead_th_sel).map(elem_text).collect();
    if headers.is_empty() {
        headers = table.select(&th_sel).map(elem_text).collect();
    }

    let mut body_rows: Vec<ElementRef<'_>> = table.select(&tbody_tr_sel).collect();
    if body_rows.is_empty() {
        body_rows = table.select(&tr_sel).collect();
    }

    let mut rows = Vec::new();
    for tr in body_rows {
        let cells: Vec<String> = tr.select(&td_sel).map(elem_text).collect();
        if cells.is_empty() {
            // Header or spacer row.
            continue;
        }

        let mut record = Record::new();
        for (idx, value) in cells.into_iter().enumerate() {
            let column = headers
                .get(idx)
                .cloned()
                .unwrap_or_else(|| format!("col_{}", idx + 1));
            record.insert(column, Value::String(value));
        }

        let detail_url = tr
            .select(&link_sel)
            .next()
            .and_then(|a| a.value().attr("href"))
            .map(|href| absolutize(base_url, href))
            .unwrap_or_default();
        record.insert("detalle_url".to_string(), Value::String(detail_url));

        rows.push(record);
    }

    rows
}

/// Parses an event detail page into field/value pairs.
///
/// Two strategies over the same document: table rows with at least two cells
/// contribute key/value pairs from the first two, then label-like elements
/// (`label`/`strong`/`b`) pair their text (trailing colons stripped) with the
/// plain text of the immediate next sibling. Table pairs win on collision.
/// When neither finds anything, the whole page text lands in a single
/// `contenido` field, so the result is never empty.
pub fn parse_event_detail(html: &str) -> Record {
    let document = Html::parse_document(html);
    let mut data = Record::new();

    let row_sel = Selector::parse("table tr").unwrap();
    let cell_sel = Selector::parse("th, td").unwrap();
    for tr in document.select(&row_sel) {
        let cells: Vec<ElementRef<'_>> = tr.select(&cell_sel).collect();
        if cells.len() >= 2 {
            let key = elem_text(cells[0]);
            if !key.is_empty() {
                data.insert(key, Value::String(elem_text(cells[1])));
            }
        }
    }

    let label_sel = Selector::parse("label, strong, b").unwrap();
    for label in document.select(&label_sel) {
        let key = elem_text(label)
            .trim_end_matches(':')
            .trim_end()
            .to_string();
        if key.is_empty() || data.contains_key(&key) {
            continue;
        }
        if let Some(value) = next_sibling_text(label) {
            data.insert(key, Value::String(value));
        }
    }

    if data.is_empty() {
        data.insert(
            "contenido".to_string(),
            Value::String(elem_text(document.root_element())),
        );
    }

    data
}

/// Plain text of the node immediately following `element`, if non-empty.
fn next_sibling_text(element: ElementRef) -> Option<String> {
    let sibling = element.next_sibling()?;
    let text = match sibling.value() {
        Node::Text(text) => normalize_whitespace(text),
        Node::Element(_) => ElementRef::wrap(sibling).map(elem_text).unwrap_or_default(),
        _ => String::new(),
    };
    (!text.is_empty()).then_some(text)
}
