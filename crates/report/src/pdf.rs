//! PDF layout: page geometry plus the running header and footer

use chrono::NaiveDate;
use kbqa_common::PdfOptions;

use crate::config::PdfLayout;

const TEMPLATE_STYLE: &str = "font-size: 10px; text-align: center; width: 100%; margin: 0 20px;";

/// Header line, e.g. `Test Execution Report - 3/7/2025`
pub fn header_text(title: &str, date: NaiveDate) -> String {
    format!("{} - {}", title, date.format("%-m/%-d/%Y"))
}

pub fn header_template(title: &str, date: NaiveDate) -> String {
    format!(
        r#"<div style="{}"><span>{}</span></div>"#,
        TEMPLATE_STYLE,
        escape_html(&header_text(title, date))
    )
}

/// Page counter; the browser fills in the two classed spans
pub fn footer_template() -> String {
    format!(
        r#"<div style="{}"><span>Page <span class="pageNumber"></span> of <span class="totalPages"></span></span></div>"#,
        TEMPLATE_STYLE
    )
}

/// Print options for the exported report, dated `date`
pub fn report_pdf_options(layout: &PdfLayout, date: NaiveDate) -> PdfOptions {
    PdfOptions {
        paper_width_mm: layout.width_mm,
        paper_height_mm: layout.height_mm,
        margin_top_px: layout.margin_top_px,
        margin_right_px: layout.margin_right_px,
        margin_bottom_px: layout.margin_bottom_px,
        margin_left_px: layout.margin_left_px,
        print_background: true,
        display_header_footer: true,
        header_template: header_template(&layout.title, date),
        footer_template: footer_template(),
        prefer_css_page_size: false,
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
