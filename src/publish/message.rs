use std::borrow::Cow;

/// Mastodon's default status length limit, in characters.
pub const MAX_STATUS_CHARS: usize = 500;

/// Ellipsis appended to a truncated summary
const ELLIPSIS: &str = "...";
/// Shortest summary worth including once truncated
const MIN_SUMMARY_CHARS: usize = 20;

/// Builds the status text for a feed entry.
///
/// Layout, in fixed order:
///
/// ```text
/// I just published a new post on {feed title}. Check it out!
///
/// "{entry title}"
///
/// {summary}
///
/// {link}
/// ```
///
/// The summary block (and its surrounding blank lines) is omitted when there
/// is no summary. Summaries arrive as plain text; they are folded onto one
/// line and truncated so the whole status stays within [`MAX_STATUS_CHARS`].
/// The title and link are never shortened. The output depends only on the
/// inputs.
pub fn compose_status(
    feed_title: &str,
    entry_title: &str,
    summary: Option<&str>,
    link: &str,
) -> String {
    let head = format!(
        "I just published a new post on {}. Check it out!\n\n\"{}\"\n",
        feed_title, entry_title
    );

    // The summary block adds "\n" + summary + "\n\n" on top of the bare layout
    let fixed_chars = head.chars().count() + link.chars().count();
    let budget = MAX_STATUS_CHARS.saturating_sub(fixed_chars + 3);

    let summary = summary
        .map(single_line)
        .filter(|s| !s.is_empty())
        .and_then(|s| fit_summary(&s, budget).map(Cow::into_owned));

    match summary {
        Some(summary) => format!("{}\n{}\n\n{}", head, summary, link),
        None => format!("{}{}", head, link),
    }
}

/// Shortens a summary to `budget` characters, or drops it when too little
/// room is left for it to be useful.
fn fit_summary(summary: &str, budget: usize) -> Option<Cow<'_, str>> {
    if summary.chars().count() <= budget {
        return Some(Cow::Borrowed(summary));
    }
    if budget < MIN_SUMMARY_CHARS {
        return None;
    }

    let keep = budget - ELLIPSIS.len();
    let cut = summary
        .char_indices()
        .nth(keep)
        .map(|(idx, _)| idx)
        .unwrap_or(summary.len());
    Some(Cow::Owned(format!(
        "{}{}",
        summary[..cut].trim_end(),
        ELLIPSIS
    )))
}

/// Collapses a summary onto one line: control characters become spaces and
/// whitespace runs shrink to a single space.
pub fn single_line(text: &str) -> String {
    text.split(|c: char| c.is_whitespace() || c.is_control())
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
