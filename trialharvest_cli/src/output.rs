use serde::Serialize;
use tabled::{Table, Tabled};
use trialharvest_lib::{CleanReport, Gap, Record, ScanEnd, YearReport, YearSummary};

#[derive(Clone, Debug)]
pub enum OutputFormat {
    Table,
    Json,
}

#[derive(Tabled, Serialize)]
struct YearReportRow {
    #[tabled(rename = "Year")]
    #[serde(rename = "Year")]
    year: u32,
    #[tabled(rename = "First")]
    #[serde(rename = "First")]
    first: String,
    #[tabled(rename = "Last")]
    #[serde(rename = "Last")]
    last: String,
    #[tabled(rename = "Probes")]
    #[serde(rename = "Probes")]
    probes: usize,
    #[tabled(rename = "Hits")]
    #[serde(rename = "Hits")]
    hits: usize,
    #[tabled(rename = "Ended")]
    #[serde(rename = "Ended")]
    ended: String,
}

#[derive(Tabled, Serialize)]
struct RecordRow {
    #[tabled(rename = "ID")]
    #[serde(rename = "ID")]
    identifier: u64,
    #[tabled(rename = "Status")]
    #[serde(rename = "Status")]
    status: String,
    #[tabled(rename = "Title")]
    #[serde(rename = "Title")]
    title: String,
    #[tabled(rename = "Fields")]
    #[serde(rename = "Fields")]
    fields: usize,
    #[tabled(rename = "Institutions")]
    #[serde(rename = "Institutions")]
    institutions: usize,
}

#[derive(Tabled)]
struct SummaryRow {
    #[tabled(rename = "Year")]
    year: u32,
    #[tabled(rename = "Records")]
    count: usize,
    #[tabled(rename = "Min")]
    min: u64,
    #[tabled(rename = "Max")]
    max: u64,
    #[tabled(rename = "Span")]
    expected_span: u64,
    #[tabled(rename = "Missing")]
    missing: u64,
    #[tabled(rename = "Gaps")]
    gaps: usize,
}

#[derive(Tabled)]
struct GapRow {
    #[tabled(rename = "Start")]
    start: u64,
    #[tabled(rename = "End")]
    end: u64,
    #[tabled(rename = "Missing")]
    count: u64,
}

#[derive(Tabled)]
struct CleanRow {
    #[tabled(rename = "Rows in")]
    rows_in: usize,
    #[tabled(rename = "Rows out")]
    rows_out: usize,
    #[tabled(rename = "Dummies removed")]
    dummies_removed: usize,
    #[tabled(rename = "Contacts dropped")]
    contacts_dropped: usize,
}

// -- Row builders --

fn build_year_report_rows(reports: &[YearReport]) -> Vec<YearReportRow> {
    reports
        .iter()
        .map(|r| YearReportRow {
            year: r.year,
            first: r.first_probed.map(|id| id.to_string()).unwrap_or_default(),
            last: r.last_probed.map(|id| id.to_string()).unwrap_or_default(),
            probes: r.probes,
            hits: r.hits,
            ended: scan_end_label(r.ended).to_string(),
        })
        .collect()
}

fn build_record_rows(records: &[Record]) -> Vec<RecordRow> {
    records
        .iter()
        .map(|r| RecordRow {
            identifier: r.identifier.get(),
            status: r.status.clone(),
            title: truncate(&r.title, 60),
            fields: r.fields.len(),
            institutions: r.institutions.len(),
        })
        .collect()
}

fn build_summary_rows(summaries: &[YearSummary]) -> Vec<SummaryRow> {
    summaries
        .iter()
        .map(|s| SummaryRow {
            year: s.year,
            count: s.count,
            min: s.min.get(),
            max: s.max.get(),
            expected_span: s.expected_span,
            missing: s.missing,
            gaps: s.gaps.len(),
        })
        .collect()
}

fn build_gap_rows(gaps: &[Gap]) -> Vec<GapRow> {
    gaps.iter()
        .map(|g| GapRow {
            start: g.start.get(),
            end: g.end.get(),
            count: g.count,
        })
        .collect()
}

fn scan_end_label(ended: ScanEnd) -> &'static str {
    match ended {
        ScanEnd::Exhausted => "exhausted",
        ScanEnd::MissThreshold => "miss threshold",
        ScanEnd::LimitReached => "limit reached",
        ScanEnd::Interrupted => "interrupted",
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max_chars).collect();
    cut.push('…');
    cut
}

// -- Printers --

pub fn print_year_reports(reports: &[YearReport], format: &OutputFormat) {
    if reports.is_empty() {
        return;
    }
    let rows = build_year_report_rows(reports);
    match format {
        OutputFormat::Table => println!("{}", Table::new(rows)),
        OutputFormat::Json => print_json(&rows),
    }
}

pub fn print_records(records: &[Record], format: &OutputFormat) {
    match format {
        OutputFormat::Table => println!("{}", Table::new(build_record_rows(records))),
        OutputFormat::Json => print_json(&records),
    }
}

pub fn print_year_summaries(summaries: &[YearSummary]) {
    println!("{}", Table::new(build_summary_rows(summaries)));
}

pub fn print_gaps(gaps: &[Gap]) {
    println!("{}", Table::new(build_gap_rows(gaps)));
}

pub fn print_clean_report(report: &CleanReport, format: &OutputFormat) {
    match format {
        OutputFormat::Table => println!(
            "{}",
            Table::new([CleanRow {
                rows_in: report.rows_in,
                rows_out: report.rows_out,
                dummies_removed: report.dummies_removed,
                contacts_dropped: report.contacts_dropped,
            }])
        ),
        OutputFormat::Json => print_json(report),
    }
}

pub fn print_json<T: serde::Serialize>(data: &T) {
    match serde_json::to_string_pretty(data) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to serialize to JSON: {}", e),
    }
}
