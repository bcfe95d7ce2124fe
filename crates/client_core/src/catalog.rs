use serde::Serialize;
use shared::{
    domain::{MediaCount, MediaItem, MediaType},
    protocol::{
        endpoints, extract_media_counts, extract_media_items, MediaDeleteItem,
        MediaDeleteRequest, MediaListRequest,
    },
};

use crate::{
    error::{ControllerError, GatewayError, Result},
    gateway::{CommandGateway, GatewayRequest},
};

pub const DEFAULT_PAGE_SIZE: u32 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CatalogQuery {
    pub media_type: MediaType,
    pub page_index: u32,
    pub page_size: u32,
}

/// `has_more` is inferred from page fullness: a page holding exactly
/// `page_size` items suggests another page may follow. The proxy reports no
/// total, so the last page of an album whose size is a multiple of
/// `page_size` still claims `has_more`, and the next page comes back empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogPage {
    pub items: Vec<MediaItem>,
    pub has_more: bool,
}

impl CatalogPage {
    pub fn from_items(items: Vec<MediaItem>, page_size: u32) -> Self {
        let has_more = items.len() == page_size as usize;
        Self { items, has_more }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum PageState {
    Idle,
    Loading,
    Loaded(CatalogPage),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogSnapshot {
    pub query: CatalogQuery,
    pub counts: Vec<MediaCount>,
    pub page: PageState,
}

impl CatalogSnapshot {
    pub fn has_more(&self) -> bool {
        matches!(&self.page, PageState::Loaded(page) if page.has_more)
    }

    pub fn has_previous(&self) -> bool {
        self.query.page_index > 0
    }
}

/// Identifies one page load; only the latest one may update the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadTicket {
    generation: u64,
    pub query: CatalogQuery,
}

#[derive(Debug)]
pub struct CatalogState {
    query: CatalogQuery,
    counts: Vec<MediaCount>,
    page: PageState,
    generation: u64,
}

impl CatalogState {
    pub fn new(media_type: MediaType, page_size: u32) -> Self {
        Self {
            query: CatalogQuery {
                media_type,
                page_index: 0,
                page_size: page_size.max(1),
            },
            counts: Vec::new(),
            page: PageState::Idle,
            generation: 0,
        }
    }

    pub fn query(&self) -> CatalogQuery {
        self.query
    }

    pub fn snapshot(&self) -> CatalogSnapshot {
        CatalogSnapshot {
            query: self.query,
            counts: self.counts.clone(),
            page: self.page.clone(),
        }
    }

    /// Shows the loading placeholder and hands out the query to fetch.
    pub fn begin_load(&mut self, reset: bool) -> LoadTicket {
        if reset {
            self.query.page_index = 0;
        }
        self.generation += 1;
        self.page = PageState::Loading;
        LoadTicket {
            generation: self.generation,
            query: self.query,
        }
    }

    pub fn set_filter(&mut self, media_type: MediaType) {
        self.query.media_type = media_type;
        self.query.page_index = 0;
    }

    /// Moves to the next page when the last one was full.
    pub fn advance(&mut self) -> bool {
        match &self.page {
            PageState::Loaded(page) if page.has_more => {
                self.query.page_index += 1;
                true
            }
            _ => false,
        }
    }

    pub fn retreat(&mut self) -> bool {
        if self.query.page_index == 0 {
            return false;
        }
        self.query.page_index -= 1;
        true
    }

    /// Applies a finished load. `None` when a newer load superseded it.
    pub fn finish_load(
        &mut self,
        ticket: LoadTicket,
        counts: Vec<MediaCount>,
        items: Vec<MediaItem>,
    ) -> Option<CatalogPage> {
        if ticket.generation != self.generation {
            return None;
        }
        let page = CatalogPage::from_items(items, ticket.query.page_size);
        self.counts = counts;
        self.page = PageState::Loaded(page.clone());
        Some(page)
    }

    pub fn fail_load(&mut self, ticket: LoadTicket, message: impl Into<String>) -> bool {
        if ticket.generation != self.generation {
            return false;
        }
        self.page = PageState::Failed(message.into());
        true
    }

    pub fn reset(&mut self) {
        self.generation += 1;
        self.query.page_index = 0;
        self.counts.clear();
        self.page = PageState::Idle;
    }
}

/// Fetches counts and the page concurrently; the first failure wins.
pub(crate) async fn fetch_page(
    gateway: &dyn CommandGateway,
    address: &str,
    query: CatalogQuery,
) -> Result<(Vec<MediaCount>, Vec<MediaItem>)> {
    let counts_request = GatewayRequest::get(endpoints::ALBUM_COUNTS).for_device(address);
    let list_request = GatewayRequest::post(endpoints::ALBUM_LIST)
        .for_device(address)
        .with_body(&MediaListRequest {
            media_type: query.media_type,
            page_index: query.page_index,
            page_size: query.page_size,
        })?;

    let (counts_payload, list_payload) =
        futures::try_join!(gateway.send(counts_request), gateway.send(list_request))?;

    let counts = extract_media_counts(&counts_payload)
        .map_err(|err| GatewayError::Protocol(format!("invalid album counts: {err}")))?;
    let items = extract_media_items(&list_payload, query.media_type)
        .map_err(|err| GatewayError::Protocol(format!("invalid album list: {err}")))?;
    Ok((counts, items))
}

pub(crate) fn delete_request(address: &str, item: &MediaItem) -> Result<GatewayRequest> {
    GatewayRequest::post(endpoints::ALBUM_DELETE)
        .for_device(address)
        .with_body(&MediaDeleteRequest {
            items: vec![MediaDeleteItem::from(item)],
        })
        .map_err(ControllerError::from)
}

#[cfg(test)]
#[path = "tests/catalog_tests.rs"]
mod tests;
