//! Table extraction (§4.3 step 1 media collection), split out from
//! `scrape` as its own pass over the cleaned document -- mirrors the
//! teacher's dedicated table-extraction module rather than folding table
//! parsing into the generic media walk.

use scraper::{Html, Selector};

use crawlforge_types::result::TableData;

/// Walks every `<table>` in the document, splitting the first row off as
/// headers when it is made of `<th>` cells and treating the rest as body
/// rows. Rowspan/colspan are not expanded -- each cell contributes its own
/// text, matching the row/column shape the source HTML lays out.
pub fn collect_tables(document: &Html) -> Vec<TableData> {
    let table_selector = Selector::parse("table").expect("static selector");
    let row_selector = Selector::parse("tr").expect("static selector");
    let header_cell_selector = Selector::parse("th").expect("static selector");
    let cell_selector = Selector::parse("td,th").expect("static selector");
    let caption_selector = Selector::parse("caption").expect("static selector");

    document
        .select(&table_selector)
        .map(|table| {
            let caption = table
                .select(&caption_selector)
                .next()
                .map(|c| c.text().collect::<Vec<_>>().join(" ").trim().to_string());

            let mut rows_iter = table.select(&row_selector);
            let headers = rows_iter
                .next()
                .map(|row| {
                    row.select(&header_cell_selector)
                        .map(|c| c.text().collect::<Vec<_>>().join(" ").trim().to_string())
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default();

            let rows: Vec<Vec<String>> = table
                .select(&row_selector)
                .skip(if headers.is_empty() { 0 } else { 1 })
                .map(|row| {
                    row.select(&cell_selector)
                        .map(|c| c.text().collect::<Vec<_>>().join(" ").trim().to_string())
                        .collect()
                })
                .filter(|r: &Vec<String>| !r.is_empty())
                .collect();

            TableData {
                headers,
                rows,
                caption,
                summary: table.value().attr("summary").map(str::to_string),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_extraction_collects_headers_and_rows() {
        let html = r#"
            <table><caption>People</caption>
                <tr><th>Name</th><th>Age</th></tr>
                <tr><td>John</td><td>30</td></tr>
            </table>
        "#;
        let document = Html::parse_document(html);
        let tables = collect_tables(&document);
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].headers, vec!["Name", "Age"]);
        assert_eq!(tables[0].rows, vec![vec!["John".to_string(), "30".to_string()]]);
        assert_eq!(tables[0].caption.as_deref(), Some("People"));
    }

    #[test]
    fn table_without_header_row_has_no_headers_and_keeps_all_rows_as_body() {
        let html = r#"<table><tr><td>a</td><td>b</td></tr><tr><td>c</td><td>d</td></tr></table>"#;
        let document = Html::parse_document(html);
        let tables = collect_tables(&document);
        assert_eq!(tables.len(), 1);
        assert!(tables[0].headers.is_empty());
        assert_eq!(tables[0].rows.len(), 2);
    }

    #[test]
    fn summary_attribute_is_captured_when_present() {
        let html = r#"<table summary="a summary"><tr><td>x</td></tr></table>"#;
        let document = Html::parse_document(html);
        let tables = collect_tables(&document);
        assert_eq!(tables[0].summary.as_deref(), Some("a summary"));
    }
}
