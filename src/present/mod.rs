use std::io::{self, Write};

use crate::quotes::{Quote, ALL_CATEGORIES};
use crate::sync::Conflict;

pub const EMPTY_STORE_MESSAGE: &str = "No quotes available. Please add one!";

/// Everything the quote core needs from a user interface.
pub trait Presenter {
    fn render_list(&mut self, quotes: &[Quote]);
    fn render_random(&mut self, quote: Option<&Quote>);
    fn render_categories(&mut self, categories: &[&str], selected: &str);
    fn render_conflicts(&mut self, conflicts: &[Conflict]);
    fn notify(&mut self, message: &str);
    fn selected_filter(&self) -> String;
    fn select_filter(&mut self, category: &str);
}

pub struct TerminalPresenter<W: Write> {
    out: W,
    filter: String,
}

impl TerminalPresenter<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> TerminalPresenter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            filter: ALL_CATEGORIES.to_string(),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn emit(&mut self, text: &str) {
        if let Err(err) = self.out.write_all(text.as_bytes()).and_then(|_| self.out.flush()) {
            tracing::debug!(%err, "terminal output failed");
        }
    }
}

pub fn format_random(quote: Option<&Quote>) -> String {
    match quote {
        Some(quote) => format!("\"{}\"\n    Category: {}\n", quote.text, quote.category),
        None => format!("{EMPTY_STORE_MESSAGE}\n"),
    }
}

pub fn format_list(quotes: &[Quote]) -> String {
    if quotes.is_empty() {
        return "No quotes in this category.\n".to_string();
    }
    let mut out = String::new();
    for (idx, quote) in quotes.iter().enumerate() {
        out.push_str(&format!(
            "{:>3}. \"{}\" ({})\n",
            idx + 1,
            quote.text,
            quote.category
        ));
    }
    out
}

/// Both sides of each conflict, numbered from 1 the way `review --local` expects.
pub fn format_conflicts(conflicts: &[Conflict]) -> String {
    let mut out = String::from("Conflicts from the last sync (server value already applied):\n");
    for (idx, conflict) in conflicts.iter().enumerate() {
        out.push_str(&format!(
            "  #{} \"{}\"\n      local:  {}\n      server: {}\n",
            idx + 1,
            conflict.local_before.text,
            conflict.local_before.category,
            conflict.server.category
        ));
    }
    out
}

impl<W: Write> Presenter for TerminalPresenter<W> {
    fn render_list(&mut self, quotes: &[Quote]) {
        let text = format_list(quotes);
        self.emit(&text);
    }

    fn render_random(&mut self, quote: Option<&Quote>) {
        let text = format_random(quote);
        self.emit(&text);
    }

    fn render_categories(&mut self, categories: &[&str], selected: &str) {
        let mut text = String::new();
        for category in categories {
            let marker = if *category == selected { "*" } else { " " };
            text.push_str(&format!("{marker} {category}\n"));
        }
        self.emit(&text);
    }

    fn render_conflicts(&mut self, conflicts: &[Conflict]) {
        let text = format_conflicts(conflicts);
        self.emit(&text);
    }

    fn notify(&mut self, message: &str) {
        let text = format!("» {message}\n");
        self.emit(&text);
    }

    fn selected_filter(&self) -> String {
        self.filter.clone()
    }

    fn select_filter(&mut self, category: &str) {
        self.filter = category.to_string();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use insta::assert_snapshot;

    /// Captures presenter calls for assertions.
    #[derive(Debug, Default)]
    pub(crate) struct RecordingPresenter {
        pub lists: Vec<Vec<Quote>>,
        pub randoms: Vec<Option<Quote>>,
        pub notices: Vec<String>,
        pub filter: String,
    }

    impl RecordingPresenter {
        pub(crate) fn new() -> Self {
            Self {
                filter: ALL_CATEGORIES.to_string(),
                ..Self::default()
            }
        }
    }

    impl Presenter for RecordingPresenter {
        fn render_list(&mut self, quotes: &[Quote]) {
            self.lists.push(quotes.to_vec());
        }

        fn render_random(&mut self, quote: Option<&Quote>) {
            self.randoms.push(quote.cloned());
        }

        fn render_categories(&mut self, _categories: &[&str], _selected: &str) {}

        fn render_conflicts(&mut self, _conflicts: &[Conflict]) {}

        fn notify(&mut self, message: &str) {
            self.notices.push(message.to_string());
        }

        fn selected_filter(&self) -> String {
            self.filter.clone()
        }

        fn select_filter(&mut self, category: &str) {
            self.filter = category.to_string();
        }
    }

    #[test]
    fn random_quote_rendering() {
        let quote = Quote::new("Happiness depends upon ourselves.", "Philosophy");
        assert_snapshot!(format_random(Some(&quote)).trim_end(), @r###"
        "Happiness depends upon ourselves."
            Category: Philosophy
        "###);
        assert_eq!(format_random(None), format!("{EMPTY_STORE_MESSAGE}\n"));
    }

    #[test]
    fn terminal_presenter_writes_notices_and_categories() {
        let mut presenter = TerminalPresenter::new(Vec::new());
        presenter.notify("Quotes imported successfully!");
        presenter.render_categories(&["All", "Life"], "Life");

        let written = String::from_utf8(presenter.into_inner()).expect("utf8 output");
        assert_eq!(written, "» Quotes imported successfully!\n  All\n* Life\n");
    }

    #[test]
    fn conflict_listing_shows_both_sides() {
        let text = format_conflicts(&[Conflict {
            local_before: Quote::new("A", "X"),
            server: Quote::new("A", "Y"),
        }]);
        assert_snapshot!(text.trim_end(), @r###"
        Conflicts from the last sync (server value already applied):
          #1 "A"
              local:  X
              server: Y
        "###);
    }

    #[test]
    fn list_rendering_numbers_entries() {
        let text = format_list(&[Quote::new("A", "X"), Quote::new("B", "Y")]);
        assert_eq!(text, "  1. \"A\" (X)\n  2. \"B\" (Y)\n");
        assert_eq!(format_list(&[]), "No quotes in this category.\n");
    }
}
