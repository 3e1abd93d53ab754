//! batching of pending operations under count, payload and url ceilings.

use fmcsync_core::{body_len, Item, ItemSchema, Section};

/// item-count ceiling of one bulk create request.
pub const BULK_SIZE_CREATE: usize = 1000;
/// item-count ceiling of one bulk delete request.
pub const BULK_SIZE_DELETE: usize = 1000;
/// maximum serialized request body in bytes.
pub const MAX_PAYLOAD_SIZE: usize = 2_048_000;
/// maximum length of the encoded `ids:` filter value, prefix included.
pub const MAX_URL_PARAM_LENGTH: usize = 7_000;

const FILTER_PREFIX: &str = "ids:";

/// ceilings for one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkLimits {
    pub max_count: usize,
    pub max_payload_bytes: usize,
    pub max_url_bytes: usize,
}

impl ChunkLimits {
    pub const fn create() -> Self {
        Self {
            max_count: BULK_SIZE_CREATE,
            max_payload_bytes: MAX_PAYLOAD_SIZE,
            max_url_bytes: usize::MAX,
        }
    }

    pub const fn delete() -> Self {
        Self {
            max_count: BULK_SIZE_DELETE,
            max_payload_bytes: usize::MAX,
            max_url_bytes: MAX_URL_PARAM_LENGTH,
        }
    }
}

/// contribution of one operation to a chunk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpSize {
    pub payload: usize,
    pub url: usize,
}

/// operations sent as one bulk request.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk<T> {
    pub section: Option<Section>,
    pub ops: Vec<T>,
}

/// split `ops` into ordered, non-empty chunks.
///
/// Payload is accounted as a json array (brackets plus one comma per extra
/// element) and the url as a comma-joined id list. A single operation larger
/// than a ceiling still gets a chunk of its own. A chunk never spans two
/// sections.
pub fn chunk<T>(
    ops: Vec<T>,
    limits: &ChunkLimits,
    measure: impl Fn(&T) -> OpSize,
    section_of: impl Fn(&T) -> Option<Section>,
) -> Vec<Chunk<T>> {
    let max_count = limits.max_count.max(1);
    let mut chunks = Vec::new();
    let mut current: Vec<T> = Vec::new();
    let mut section: Option<Section> = None;
    let mut payload = 0usize;
    let mut url = 0usize;

    for op in ops {
        let size = measure(&op);
        let op_section = section_of(&op);

        if !current.is_empty() {
            let full = current.len() >= max_count
                || payload.saturating_add(1).saturating_add(size.payload)
                    > limits.max_payload_bytes
                || url.saturating_add(1).saturating_add(size.url) > limits.max_url_bytes
                || op_section != section;
            if full {
                chunks.push(Chunk {
                    section: section.take(),
                    ops: std::mem::take(&mut current),
                });
            }
        }

        if current.is_empty() {
            section = op_section;
            payload = size.payload.saturating_add(2);
            url = size.url;
        } else {
            payload = payload.saturating_add(1).saturating_add(size.payload);
            url = url.saturating_add(1).saturating_add(size.url);
        }
        current.push(op);
    }

    if !current.is_empty() {
        chunks.push(Chunk {
            section,
            ops: current,
        });
    }
    chunks
}

/// chunk items for bulk create; ordered schemas split on section changes.
pub fn create_chunks(schema: &ItemSchema, items: Vec<Item>, limits: &ChunkLimits) -> Vec<Chunk<Item>> {
    chunk(
        items,
        limits,
        |item| OpSize {
            payload: body_len(schema, item),
            url: 0,
        },
        |item| {
            if schema.ordered {
                item.section.clone()
            } else {
                None
            }
        },
    )
}

/// chunk recorded items for bulk delete by their encoded ids.
///
/// `max_url_bytes` bounds the whole filter value built by [`id_filter`].
pub fn delete_chunks(items: Vec<Item>, limits: &ChunkLimits) -> Vec<Chunk<Item>> {
    let limits = ChunkLimits {
        max_url_bytes: limits.max_url_bytes.saturating_sub(FILTER_PREFIX.len()),
        ..*limits
    };
    chunk(
        items,
        &limits,
        |item| OpSize {
            payload: 0,
            url: encode_id(item.id().unwrap_or_default()).len(),
        },
        |_| None,
    )
}

/// percent-encode one id for the `ids:` filter.
pub fn encode_id(id: &str) -> String {
    url::form_urlencoded::byte_serialize(id.as_bytes()).collect()
}

/// build the `ids:<a>,<b>` filter value from raw ids.
pub fn id_filter(ids: &[String]) -> String {
    let encoded: Vec<String> = ids.iter().map(|id| encode_id(id)).collect();
    format!("{FILTER_PREFIX}{}", encoded.join(","))
}
