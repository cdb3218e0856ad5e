//! Turns repeated listing polls into an endless stream of new items.

use crate::backoff::PollBackoff;
use crate::provider::ItemStream;
use replybot_core::{CoreError, FeedItem};
use std::collections::{HashSet, VecDeque};
use std::future::Future;
use tracing::{debug, warn};

/// How many recent fullnames are remembered for de-duplication.
pub const SEEN_CAPACITY: usize = 301;

const PAGE_LIMIT: u32 = 100;

/// Without a `before` cursor Reddit may serve a cached page; varying the limit sidesteps it.
const CACHE_BUST_CYCLE: u32 = 30;

/// Insertion-ordered set that forgets its oldest entry once full.
#[derive(Debug)]
pub struct BoundedSet {
    capacity: usize,
    order: VecDeque<String>,
    members: HashSet<String>,
}

impl BoundedSet {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity),
            members: HashSet::with_capacity(capacity),
        }
    }

    /// Returns `false` if the key was already present.
    pub fn insert(&mut self, key: String) -> bool {
        if self.members.contains(&key) {
            return false;
        }
        if self.order.len() == self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.members.remove(&oldest);
            }
        }
        self.members.insert(key.clone());
        self.order.push_back(key);
        true
    }
}

/// Polls `fetch(limit, before)` forever and yields every item not seen before, oldest first.
///
/// `fetch` must return items newest first, the way Reddit listings are ordered. With
/// `skip_existing` the first page only primes the seen-set. The first fetch error is yielded
/// and ends the stream.
pub fn poll_listing<F, Fut>(mut fetch: F, skip_existing: bool, mut backoff: PollBackoff) -> ItemStream
where
    F: FnMut(u32, Option<String>) -> Fut + Send + 'static,
    Fut: Future<Output = Result<Vec<FeedItem>, CoreError>> + Send + 'static,
{
    Box::pin(async_stream::stream! {
        let mut seen = BoundedSet::new(SEEN_CAPACITY);
        let mut before: Option<String> = None;
        let mut without_before: u32 = 0;
        let mut skip_existing = skip_existing;

        loop {
            let mut limit = PAGE_LIMIT;
            if before.is_none() {
                limit -= without_before;
                without_before = (without_before + 1) % CACHE_BUST_CYCLE;
            }

            let batch = match fetch(limit, before.clone()).await {
                Ok(batch) => batch,
                Err(e) => {
                    warn!("Listing poll failed, ending stream: {}", e);
                    yield Err(e);
                    break;
                }
            };

            let mut newest = None;
            for item in batch.into_iter().rev() {
                if !seen.insert(item.fullname.clone()) {
                    continue;
                }
                newest = Some(item.fullname.clone());
                if !skip_existing {
                    yield Ok(item);
                }
            }

            let found = newest.is_some();
            before = newest;
            skip_existing = false;

            if found {
                backoff.reset();
            } else {
                let delay = backoff.next_delay();
                debug!("No new items, next poll in {:?}", delay);
                tokio::time::sleep(delay).await;
            }
        }
    })
}
