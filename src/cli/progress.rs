//! Progress bars, tables and summary reporting for CLI runs.

use std::sync::Mutex;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use crate::models::{ContentCategory, PopularSearchItem, SearchResults, SearchResultsItem};
use crate::{DownloadProgress, FileStats, SessionStats, format_bytes, format_duration};

const SEPARATOR: &str = "────────────────────────────────────────────────────────────";

/// Creates a progress bar for a single file download.
pub fn make_progress_bar(size: u64, name: &str) -> ProgressBar {
    let bar = ProgressBar::new(size);
    bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.cyan} [{bar:40.cyan/blue}] {bytes}/{total_bytes} @ {bytes_per_sec} ({eta}) - {msg}",
        )
        .expect("progress template is valid")
        .progress_chars("━━╌"),
    );
    bar.set_message(name.to_string());
    bar
}

/// Renders transfers as indicatif bars, one at a time.
#[derive(Default)]
pub struct BarProgress {
    bar: Mutex<Option<ProgressBar>>,
}

impl BarProgress {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_bar(&self, f: impl FnOnce(&ProgressBar)) {
        if let Ok(guard) = self.bar.lock()
            && let Some(bar) = guard.as_ref()
        {
            f(bar);
        }
    }

    fn take_bar(&self) -> Option<ProgressBar> {
        self.bar.lock().ok().and_then(|mut guard| guard.take())
    }
}

impl DownloadProgress for BarProgress {
    fn on_file_start(&self, name: &str, size: u64, already: u64) {
        let bar = make_progress_bar(size, name);
        bar.set_position(already);
        bar.reset_eta();
        bar.enable_steady_tick(Duration::from_millis(250));
        if let Ok(mut guard) = self.bar.lock() {
            *guard = Some(bar);
        }
    }

    fn on_progress(&self, _name: &str, bytes_delta: u64, _speed: u64) {
        self.with_bar(|bar| bar.inc(bytes_delta));
    }

    fn on_file_complete(&self, name: &str, stats: &FileStats) {
        if let Some(bar) = self.take_bar() {
            bar.finish_and_clear();
        }
        let ramp_up = stats.ramp_up_time.map_or_else(
            || "ramp <1s".to_string(),
            |d| format!("ramp {}", format_duration(d)),
        );
        println!(
            "  {name} - {} in {} ({}/s avg, {}/s peak, {ramp_up})",
            format_bytes(stats.size),
            format_duration(stats.elapsed),
            format_bytes(stats.average_speed),
            format_bytes(stats.peak_speed),
        );
    }

    fn on_error(&self, name: &str, error: &str) {
        if let Some(bar) = self.take_bar() {
            bar.abandon_with_message(format!("{name} - failed: {error}"));
        }
    }

    fn on_partial_detected(&self, name: &str, existing_size: u64, expected_size: u64) {
        println!(
            "  Resuming {name} at {} of {}",
            format_bytes(existing_size),
            format_bytes(expected_size)
        );
    }
}

/// Prints the files about to be downloaded.
pub fn print_file_list(files: &[(String, u64)]) {
    if files.is_empty() {
        println!("Nothing to download.");
        return;
    }

    let total_size: u64 = files.iter().map(|(_, size)| size).sum();

    println!("\n{SEPARATOR}");
    println!("Files to download:");
    println!("{SEPARATOR}");
    for (name, size) in files {
        println!("  {name} ({})", format_bytes(*size));
    }
    println!("{SEPARATOR}");
    println!("  {} file(s), {} total", files.len(), format_bytes(total_size));
    println!("{SEPARATOR}\n");
}

/// Prints a summary of download statistics.
pub fn print_summary(stats: &SessionStats) {
    if stats.files_downloaded == 0 && stats.files_skipped == 0 {
        return;
    }

    println!("\n{SEPARATOR}");
    println!("Download Summary");
    println!("{SEPARATOR}");

    if stats.files_downloaded > 0 {
        println!("  Files downloaded:  {}", stats.files_downloaded);
        if stats.files_resumed > 0 {
            println!("  Files resumed:     {}", stats.files_resumed);
        }
        println!("  Total size:        {}", format_bytes(stats.total_bytes));
        println!("  Total time:        {}", format_duration(stats.elapsed));
        println!(
            "  Average speed:     {}/s",
            format_bytes(stats.average_speed())
        );
        println!("  Peak speed:        {}/s", format_bytes(stats.peak_speed));
        if let Some(ramp) = stats.average_ramp_up {
            println!(
                "  Avg ramp-up:       {} to 80% of peak",
                format_duration(ramp)
            );
        }
    }

    if stats.files_skipped > 0 {
        println!("  Files skipped:     {} (already complete)", stats.files_skipped);
    }

    println!("{SEPARATOR}");
}

/// One table row for a search result or listing entry.
fn item_row(position: usize, item: &SearchResultsItem) -> String {
    let year = item
        .release_year()
        .map_or_else(|| "----".to_string(), |y| y.to_string());
    format!(
        "{position:>3}. {} ({year}) [{}] {:.1} {}",
        item.title,
        item.subject_type,
        item.imdb_rating_value,
        item.genre.join(", ")
    )
}

/// Prints one page of search results.
pub fn print_search_results(keyword: &str, results: &SearchResults) {
    let pager = &results.pager;
    println!("\n{SEPARATOR}");
    println!(
        "Results for '{keyword}' - page {} ({} total{})",
        pager.page,
        pager.total_count,
        if pager.has_more { ", more available" } else { "" }
    );
    println!("{SEPARATOR}");
    for (index, item) in results.items.iter().enumerate() {
        println!("{}", item_row(index + 1, item));
    }
    println!("{SEPARATOR}");
}

/// Prints the homepage categories and their subjects.
pub fn print_categories(categories: &[&ContentCategory]) {
    for category in categories {
        println!("\n{SEPARATOR}");
        println!("{}", category.title);
        println!("{SEPARATOR}");
        if let Some(banner) = &category.banner {
            for item in &banner.items {
                println!("  * {} [{}]", item.title, item.subject_type);
            }
        }
        for (index, item) in category.subjects.iter().enumerate() {
            println!("{}", item_row(index + 1, item));
        }
    }
    println!("{SEPARATOR}");
}

/// Prints the titles everyone is searching for.
pub fn print_popular(items: &[PopularSearchItem]) {
    println!("\n{SEPARATOR}");
    println!("Popular searches");
    println!("{SEPARATOR}");
    for (index, item) in items.iter().enumerate() {
        println!("{:>3}. {}", index + 1, item.title);
    }
    println!("{SEPARATOR}");
}
