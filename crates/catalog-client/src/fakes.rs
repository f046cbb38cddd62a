//! In-memory catalog fake (testing only)
//!
//! `FakeCatalog` pages through a fixed item list, applies mutations to its
//! own copy of the items, records every call, and can be scripted to fail
//! listing or individual mutations.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::ClientError;
use crate::types::{CatalogItem, ClientStats, Cursor, Mutation, Page};
use crate::{CatalogClient, Result};

#[derive(Debug, Clone)]
enum Failure {
    Times(ClientError, usize),
    Always(ClientError),
    /// Like `Times`, but the first failing call still applies the mutation
    LandThenFail {
        error: ClientError,
        remaining: usize,
        landed: bool,
    },
}

#[derive(Debug, Default)]
struct FakeState {
    items: Vec<CatalogItem>,
    mutations: Vec<(String, Mutation)>,
    list_calls: usize,
    requests: u64,
    list_failures: VecDeque<ClientError>,
    mutation_failures: HashMap<(String, &'static str), Failure>,
}

/// Scripted in-memory catalog.
///
/// Cursors are item offsets rendered as strings.
#[derive(Debug)]
pub struct FakeCatalog {
    page_size: usize,
    state: Mutex<FakeState>,
}

impl FakeCatalog {
    pub fn new(items: Vec<CatalogItem>, page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            state: Mutex::new(FakeState {
                items,
                ..FakeState::default()
            }),
        }
    }

    /// Make the next `list_page` calls fail with `errors`, in order.
    pub fn fail_listing(&self, errors: impl IntoIterator<Item = ClientError>) {
        self.state.lock().unwrap().list_failures.extend(errors);
    }

    /// Make mutations of `aspect` on `item_id` fail `times` times, then succeed.
    pub fn fail_mutation_times(
        &self,
        item_id: &str,
        aspect: &'static str,
        error: ClientError,
        times: usize,
    ) {
        self.state
            .lock()
            .unwrap()
            .mutation_failures
            .insert((item_id.to_string(), aspect), Failure::Times(error, times));
    }

    /// Make mutations of `aspect` on `item_id` fail `times` times, with the
    /// first failing call applying the change anyway (a request that landed
    /// before the connection dropped).
    pub fn land_then_fail(
        &self,
        item_id: &str,
        aspect: &'static str,
        error: ClientError,
        times: usize,
    ) {
        self.state.lock().unwrap().mutation_failures.insert(
            (item_id.to_string(), aspect),
            Failure::LandThenFail {
                error,
                remaining: times,
                landed: false,
            },
        );
    }

    /// Make every mutation of `aspect` on `item_id` fail.
    pub fn reject_mutation(&self, item_id: &str, aspect: &'static str, error: ClientError) {
        self.state
            .lock()
            .unwrap()
            .mutation_failures
            .insert((item_id.to_string(), aspect), Failure::Always(error));
    }

    /// Successful mutations in the order they were applied.
    pub fn mutations(&self) -> Vec<(String, Mutation)> {
        self.state.lock().unwrap().mutations.clone()
    }

    pub fn mutation_count(&self) -> usize {
        self.state.lock().unwrap().mutations.len()
    }

    /// Ids of items that received at least one successful mutation, in first-touch order.
    pub fn touched_items(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        let mut seen = Vec::new();
        for (id, _) in &state.mutations {
            if !seen.contains(id) {
                seen.push(id.clone());
            }
        }
        seen
    }

    pub fn list_calls(&self) -> usize {
        self.state.lock().unwrap().list_calls
    }

    /// Current copy of an item, reflecting applied mutations.
    pub fn item(&self, item_id: &str) -> Option<CatalogItem> {
        self.state
            .lock()
            .unwrap()
            .items
            .iter()
            .find(|i| i.id == item_id)
            .cloned()
    }

    /// Next scripted error for `key`, and whether the mutation lands anyway.
    fn take_failure(
        state: &mut FakeState,
        key: &(String, &'static str),
    ) -> Option<(ClientError, bool)> {
        match state.mutation_failures.get_mut(key) {
            Some(Failure::Always(err)) => Some((err.clone(), false)),
            Some(Failure::Times(err, remaining)) if *remaining > 0 => {
                *remaining -= 1;
                Some((err.clone(), false))
            }
            Some(Failure::LandThenFail {
                error,
                remaining,
                landed,
            }) if *remaining > 0 => {
                *remaining -= 1;
                let land = !*landed;
                *landed = true;
                Some((error.clone(), land))
            }
            _ => None,
        }
    }

    fn mutate(state: &mut FakeState, item_id: &str, mutation: &Mutation) -> Result<()> {
        let item = state
            .items
            .iter_mut()
            .find(|i| i.id == item_id)
            .ok_or_else(|| ClientError::item("HTTP 404: product not found"))?;

        match mutation {
            Mutation::SwapImages { first, second } => {
                let a = item.images.iter().position(|i| &i.id == first);
                let b = item.images.iter().position(|i| &i.id == second);
                match (a, b) {
                    (Some(a), Some(b)) => item.images.swap(a, b),
                    _ => return Err(ClientError::item("HTTP 404: image not found")),
                }
            }
            Mutation::SetPrice { variant_id, price } => match item.variant.as_mut() {
                Some(v) if &v.id == variant_id => v.price = Some(*price),
                _ => return Err(ClientError::item("HTTP 404: variant not found")),
            },
        }

        state.mutations.push((item_id.to_string(), mutation.clone()));
        Ok(())
    }
}

#[async_trait]
impl CatalogClient for FakeCatalog {
    async fn list_page(&self, cursor: Option<&Cursor>) -> Result<Page> {
        let mut state = self.state.lock().unwrap();
        state.list_calls += 1;
        state.requests += 1;
        if let Some(err) = state.list_failures.pop_front() {
            return Err(err);
        }

        let start = match cursor {
            Some(c) => c
                .as_str()
                .parse::<usize>()
                .map_err(|_| ClientError::Decode(format!("bad cursor {c}")))?,
            None => 0,
        };
        let start = start.min(state.items.len());
        let end = (start + self.page_size).min(state.items.len());
        let next = (end < state.items.len()).then(|| Cursor(end.to_string()));

        Ok(Page {
            items: state.items[start..end].to_vec(),
            next,
        })
    }

    async fn apply_mutation(&self, item_id: &str, mutation: &Mutation) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.requests += 1;
        let key = (item_id.to_string(), mutation.aspect());
        if let Some((err, land)) = Self::take_failure(&mut state, &key) {
            if land {
                Self::mutate(&mut state, item_id, mutation)?;
            }
            return Err(err);
        }
        Self::mutate(&mut state, item_id, mutation)
    }

    fn stats(&self) -> ClientStats {
        ClientStats {
            requests: self.state.lock().unwrap().requests,
            rate_limited: 0,
        }
    }
}
