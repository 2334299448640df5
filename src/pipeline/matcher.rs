use crate::sources::NewsItem;

/// Strategy for assigning a news item to one of the tracked issuers. The
/// orchestrator only depends on this seam, so smarter matching (entity
/// resolution, alias tables) can replace the default without touching the
/// cycle logic.
pub trait NewsMatcher: Send + Sync {
    /// First matching ticker wins; `None` drops the item.
    fn match_issuer<'a>(&self, item: &NewsItem, tickers: &'a [String]) -> Option<&'a str>;
}

/// Naive default: the first configured ticker appearing verbatim in the
/// item's title claims the item.
#[derive(Debug, Clone, Copy, Default)]
pub struct TickerSubstringMatcher;

impl NewsMatcher for TickerSubstringMatcher {
    fn match_issuer<'a>(&self, item: &NewsItem, tickers: &'a [String]) -> Option<&'a str> {
        tickers
            .iter()
            .find(|ticker| !ticker.is_empty() && item.title.contains(ticker.as_str()))
            .map(String::as_str)
    }
}
