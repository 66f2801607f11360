//! Route tables
//!
//! A [`Router`] resolves an address to a route in two tiers:
//!
//! 1. exact routes, looked up by address in a hash map
//! 2. matcher routes, scanned in registration order, first match wins
//!
//! An exact route always wins over a matcher route for the same address.
//! Matcher routes are keyed by their declared address: adding one with an
//! address already in the list replaces that entry in place.
//!
//! Both tables are copy-on-write, so lookups never wait for route changes and
//! always see a complete table.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use xosc_core::{validate_address, AddressMatcher, CopyOnWriteList, CopyOnWriteMap};

use crate::error::{Result, RouterError};

/// Something a [`Router`] can store
pub trait Route: Send + Sync + 'static {
    /// Declared address, the key for replace and unroute
    fn address(&self) -> &str;

    /// Predicate for matcher routes, `None` for exact routes
    fn matcher(&self) -> Option<&AddressMatcher>;

    /// Name of the value type the route carries
    fn type_name(&self) -> &'static str;

    /// Type tag the route's converter requires, if any
    fn type_tag(&self) -> Option<&str>;
}

/// Description of one registered route
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteInfo {
    pub address: String,
    /// Matcher description, `None` for exact routes
    pub matcher: Option<String>,
    pub type_name: String,
    pub type_tag: Option<String>,
}

impl RouteInfo {
    fn of<R: Route + ?Sized>(route: &R) -> Self {
        Self {
            address: route.address().to_string(),
            matcher: route.matcher().map(|m| m.description().to_string()),
            type_name: route.type_name().to_string(),
            type_tag: route.type_tag().map(str::to_string),
        }
    }
}

/// Exact and matcher route tables
pub struct Router<R: Route + ?Sized> {
    exact: CopyOnWriteMap<String, Arc<R>>,
    matchers: CopyOnWriteList<Arc<R>>,
}

impl<R: Route + ?Sized> Router<R> {
    pub fn new() -> Self {
        Self {
            exact: CopyOnWriteMap::new(),
            matchers: CopyOnWriteList::new(),
        }
    }

    /// Add a route, replacing the one with the same address in its table.
    ///
    /// Returns the replaced route.
    pub fn add_route(&self, route: Arc<R>) -> Result<Option<Arc<R>>> {
        validate_address(route.address())?;
        let address = route.address().to_string();

        let replaced = if let Some(matcher) = route.matcher() {
            info!("Routing {} ({}) as {}", address, matcher.description(), route.type_name());
            self.matchers
                .add_or_replace(route.clone(), |r| r.address() == address)
        } else {
            info!("Routing {} as {}", address, route.type_name());
            self.exact.insert(address, route)
        };
        Ok(replaced)
    }

    /// Remove the routes of every address.
    ///
    /// Fails on the first address with no route in either table. Routes of
    /// the addresses before it stay removed.
    pub fn unroute(&self, addresses: &[&str]) -> Result<()> {
        for &address in addresses {
            let exact = self.exact.remove(address);
            let matched = self.matchers.remove(|r| r.address() == address);
            if exact.is_none() && matched.is_none() {
                return Err(RouterError::NotRouted(address.to_string()));
            }
            info!("Unrouted {}", address);
        }
        Ok(())
    }

    /// The route for `address`, exact routes first
    pub fn resolve(&self, address: &str) -> Option<Arc<R>> {
        if let Some(route) = self.exact.get(address) {
            return Some(route);
        }
        self.matchers
            .snapshot()
            .iter()
            .find(|r| r.matcher().is_some_and(|m| m.matches(address)))
            .cloned()
    }

    /// Every route in lookup order: exact routes by address, then matchers
    pub fn routes(&self) -> Vec<Arc<R>> {
        let exact = self.exact.snapshot();
        let mut routes: Vec<Arc<R>> = exact.values().cloned().collect();
        routes.sort_by(|a, b| a.address().cmp(b.address()));
        routes.extend(self.matchers.snapshot().iter().cloned());
        routes
    }

    /// Every route, described
    pub fn route_infos(&self) -> Vec<RouteInfo> {
        self.routes().iter().map(|r| RouteInfo::of(&**r)).collect()
    }

    pub fn len(&self) -> usize {
        self.exact.len() + self.matchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every route
    pub fn clear(&self) {
        self.exact.clear();
        self.matchers.clear();
    }
}

impl<R: Route + ?Sized> Default for Router<R> {
    fn default() -> Self {
        Self::new()
    }
}
