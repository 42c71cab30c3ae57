//! Paginated inline panels.
//!
//! A [`Pagination`] renders one page of items with a navigation row under them. Every page
//! button points at the shared [`PAGE_OPEN`] action with the panel id, the target page and the
//! panel's extra arguments, so turning a page keeps no state on the bot side.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dbot_callback::{CodecError, InlineKeyboard};
use dbot_core::{ActionRef, CallbackArg, OutgoingMessage, Result};
use serde_json::Value;
use tracing::{debug, warn};

use crate::action::{Action, Outcome};
use crate::context::Context;

/// Action behind every page button: `pg <panel id> <page> [args...]`.
pub const PAGE_OPEN: ActionRef = ActionRef::new("pg");

pub const DEFAULT_PAGE_SIZE: usize = 10;

/// What a [`PageSource`] hands back for a requested page.
#[derive(Debug, Clone, PartialEq)]
pub enum PageItems {
    /// Every item; the panel slices out the requested page.
    All(Vec<Value>),
    /// One page, already sliced by the source, and the size of the whole list.
    Page { items: Vec<Value>, total: usize },
}

/// One rendered page.
#[derive(Debug, Clone, PartialEq)]
pub struct PageView {
    pub items: Vec<Value>,
    /// Zero-based.
    pub page: usize,
    /// Never zero: an empty list is page 1 of 1.
    pub pages: usize,
    pub total: usize,
    /// Extra arguments the panel was opened with. Every page button carries them.
    pub args: Vec<CallbackArg>,
}

impl PageView {
    /// One-based page number, for display.
    pub fn number(&self) -> usize {
        self.page + 1
    }
}

/// Supplies a panel's items, its text and the buttons around the navigation row.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn items(&self, ctx: &Context, page: usize, args: &[CallbackArg]) -> Result<PageItems>;

    async fn text(&self, _ctx: &Context, view: &PageView) -> Result<String> {
        Ok(format!("{}/{}", view.number(), view.pages))
    }

    /// Buttons above the navigation row, usually one per item.
    fn keys<'a>(&self, keyboard: InlineKeyboard<'a>, view: &PageView) -> Result<InlineKeyboard<'a>>;

    /// Buttons below the navigation row.
    fn after_keys<'a>(
        &self,
        keyboard: InlineKeyboard<'a>,
        _view: &PageView,
    ) -> Result<InlineKeyboard<'a>> {
        Ok(keyboard)
    }
}

/// Number of pages for `total` items, at least one.
pub fn page_count(total: usize, page_size: usize) -> usize {
    total.div_ceil(page_size.max(1)).max(1)
}

/// Wraps `page` into range: below zero is the last page, past the end is the first.
pub fn normalize(total: usize, page: i64, page_size: usize) -> usize {
    let pages = page_count(total, page_size);
    match usize::try_from(page) {
        Err(_) => pages - 1,
        Ok(page) if page >= pages => 0,
        Ok(page) => page,
    }
}

/// Targets of the back and forth buttons, wrapping at both ends.
pub fn neighbours(page: usize, pages: usize) -> (usize, usize) {
    let last = pages.saturating_sub(1);
    let previous = if page == 0 { last } else { page - 1 };
    let next = if page >= last { 0 } else { page + 1 };
    (previous, next)
}

pub struct Pagination {
    id: String,
    source: Arc<dyn PageSource>,
    back: String,
    forth: String,
    middle: Option<String>,
    page_size: usize,
}

impl Pagination {
    /// `id` names the panel inside page tokens, so it must be free of whitespace.
    pub fn new(id: impl Into<String>, source: impl PageSource + 'static) -> Self {
        Self {
            id: id.into(),
            source: Arc::new(source),
            back: "<".to_string(),
            forth: ">".to_string(),
            middle: None,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn back(mut self, label: impl Into<String>) -> Self {
        self.back = label.into();
        self
    }

    pub fn forth(mut self, label: impl Into<String>) -> Self {
        self.forth = label.into();
        self
    }

    /// Label-only button between the arrows.
    pub fn middle(mut self, label: impl Into<String>) -> Self {
        self.middle = Some(label.into());
        self
    }

    /// Zero counts as one.
    pub fn page_size(mut self, size: usize) -> Self {
        self.page_size = size.max(1);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Adds a button that opens `page` of this panel with `args`.
    pub fn button<'a>(
        &self,
        keyboard: InlineKeyboard<'a>,
        text: impl Into<String>,
        page: usize,
        args: &[CallbackArg],
    ) -> std::result::Result<InlineKeyboard<'a>, CodecError> {
        keyboard.callback(text, &PAGE_OPEN, &self.token_args(page, args))
    }

    fn token_args(&self, page: usize, args: &[CallbackArg]) -> Vec<String> {
        let mut token = Vec::with_capacity(args.len() + 2);
        token.push(self.id.clone());
        token.push(page.to_string());
        token.extend(args.iter().map(ToString::to_string));
        token
    }

    /// Sends `page` of the panel, or edits it in place when opened from a button.
    pub async fn open(&self, ctx: &Context, page: i64, args: Vec<CallbackArg>) -> Result<Outcome> {
        let view = self.load(ctx, page, args).await?;
        let text = self.source.text(ctx, &view).await?;
        let markup = self.markup(ctx, &view)?;
        ctx.respond(OutgoingMessage::text(text).with_markup(markup))
            .await?;
        Ok(Outcome::Handled)
    }

    async fn load(&self, ctx: &Context, page: i64, args: Vec<CallbackArg>) -> Result<PageView> {
        let requested = usize::try_from(page).unwrap_or(0);
        let (items, total, page) = match self.source.items(ctx, requested, &args).await? {
            PageItems::All(all) => {
                let total = all.len();
                let page = normalize(total, page, self.page_size);
                let items = all
                    .into_iter()
                    .skip(page * self.page_size)
                    .take(self.page_size)
                    .collect();
                (items, total, page)
            }
            PageItems::Page { items, total } => {
                (items, total, normalize(total, page, self.page_size))
            }
        };
        debug!(panel = %self.id, page = page, total = total, "page loaded");
        Ok(PageView {
            items,
            page,
            pages: page_count(total, self.page_size),
            total,
            args,
        })
    }

    fn markup(&self, ctx: &Context, view: &PageView) -> Result<Value> {
        let keyboard = self.source.keys(ctx.keyboard(), view)?.row();
        let (previous, next) = neighbours(view.page, view.pages);
        let keyboard = self.button(keyboard, self.back.as_str(), previous, &view.args)?;
        let keyboard = match &self.middle {
            Some(label) => keyboard.text(label.as_str()),
            None => keyboard,
        };
        let keyboard = self
            .button(keyboard, self.forth.as_str(), next, &view.args)?
            .row();
        Ok(self.source.after_keys(keyboard, view)?.build())
    }
}

/// Routes page buttons to their panel by id.
pub(crate) struct PageOpen {
    panels: HashMap<String, Arc<Pagination>>,
}

impl PageOpen {
    pub(crate) fn new(panels: HashMap<String, Arc<Pagination>>) -> Self {
        Self { panels }
    }
}

#[async_trait]
impl Action for PageOpen {
    async fn run(&self, ctx: Context, args: Vec<CallbackArg>) -> Result<Outcome> {
        let mut args = args.into_iter();
        let Some(id) = args.next().map(|arg| arg.to_string()) else {
            warn!("page button without a panel id");
            return Ok(Outcome::Pass);
        };
        let page = match args.next() {
            None => 0,
            Some(arg) => match arg.as_f64().filter(|p| p.is_finite()) {
                Some(page) => page as i64,
                None => {
                    debug!(panel = %id, page = %arg, "page is not a number");
                    return Ok(Outcome::Pass);
                }
            },
        };
        let Some(panel) = self.panels.get(&id) else {
            warn!(panel = %id, "page button for an unknown panel");
            return Ok(Outcome::Pass);
        };
        panel.open(&ctx, page, args.collect()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_count() {
        assert_eq!(page_count(0, 3), 1);
        assert_eq!(page_count(3, 3), 1);
        assert_eq!(page_count(7, 3), 3);
        assert_eq!(page_count(7, 0), 7);
    }

    #[test]
    fn test_normalize_wraps_around() {
        assert_eq!(normalize(7, 1, 3), 1);
        assert_eq!(normalize(7, -1, 3), 2);
        assert_eq!(normalize(7, 3, 3), 0);
        assert_eq!(normalize(7, 99, 3), 0);
        assert_eq!(normalize(0, -1, 3), 0);
    }

    #[test]
    fn test_neighbours_wrap_at_both_ends() {
        assert_eq!(neighbours(0, 3), (2, 1));
        assert_eq!(neighbours(1, 3), (0, 2));
        assert_eq!(neighbours(2, 3), (1, 0));
        assert_eq!(neighbours(0, 1), (0, 0));
    }

    #[test]
    fn test_page_view_number_is_one_based() {
        let view = PageView {
            items: Vec::new(),
            page: 2,
            pages: 3,
            total: 7,
            args: Vec::new(),
        };
        assert_eq!(view.number(), 3);
    }
}
