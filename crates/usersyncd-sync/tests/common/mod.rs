//! In-memory directory used by the sync tests

#![allow(dead_code)]

use std::collections::{BTreeSet, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use usersyncd_client::*;
use usersyncd_core::*;
use usersyncd_sync::CredentialManager;

pub const PREFIX: &str = "host-";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    ListResources,
    GetResource(String),
    ListCredentials,
    Create(String),
    Delete(String),
    Subscribe,
}

#[derive(Default)]
struct State {
    hosts: BTreeSet<String>,
    /// Hosts the configured filter excludes.
    excluded: HashSet<String>,
    credentials: BTreeSet<String>,
    fail_create: HashSet<String>,
    fail_delete: HashSet<String>,
    fail_get: HashSet<String>,
    fail_list_resources: usize,
    fail_list_credentials: usize,
    fail_subscribe: usize,
    panic_list_credentials: bool,
    streams: VecDeque<mpsc::UnboundedReceiver<DirectoryResult<Event>>>,
    calls: Vec<Call>,
}

#[derive(Default)]
pub struct MockDirectory {
    state: Mutex<State>,
}

impl MockDirectory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_hosts(hosts: &[&str]) -> Arc<Self> {
        let mock = Self::new();
        for h in hosts {
            mock.add_host(h);
        }
        mock
    }

    pub fn add_host(&self, name: &str) {
        self.state.lock().unwrap().hosts.insert(name.to_string());
    }

    pub fn remove_host(&self, name: &str) {
        self.state.lock().unwrap().hosts.remove(name);
    }

    pub fn exclude(&self, name: &str) {
        self.state.lock().unwrap().excluded.insert(name.to_string());
    }

    pub fn add_credential(&self, name: &str) {
        self.state.lock().unwrap().credentials.insert(name.to_string());
    }

    pub fn remove_credential(&self, name: &str) {
        self.state.lock().unwrap().credentials.remove(name);
    }

    pub fn credentials(&self) -> BTreeSet<String> {
        self.state.lock().unwrap().credentials.clone()
    }

    pub fn expected_credentials(&self) -> BTreeSet<String> {
        let state = self.state.lock().unwrap();
        state.hosts.iter().map(|h| format!("{}{}", PREFIX, h)).collect()
    }

    pub fn fail_create(&self, credential: &str) {
        self.state.lock().unwrap().fail_create.insert(credential.to_string());
    }

    pub fn fail_delete(&self, credential: &str) {
        self.state.lock().unwrap().fail_delete.insert(credential.to_string());
    }

    pub fn fail_get(&self, host: &str) {
        self.state.lock().unwrap().fail_get.insert(host.to_string());
    }

    pub fn fail_list_resources(&self, times: usize) {
        self.state.lock().unwrap().fail_list_resources = times;
    }

    pub fn fail_list_credentials(&self, times: usize) {
        self.state.lock().unwrap().fail_list_credentials = times;
    }

    pub fn fail_subscribe(&self, times: usize) {
        self.state.lock().unwrap().fail_subscribe = times;
    }

    pub fn panic_on_list_credentials(&self) {
        self.state.lock().unwrap().panic_list_credentials = true;
    }

    /// Queue a stream for the next subscribe call and return its feed.
    pub fn push_stream(&self) -> mpsc::UnboundedSender<DirectoryResult<Event>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.state.lock().unwrap().streams.push_back(rx);
        tx
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.state.lock().unwrap().calls.iter().filter(|c| pred(c)).count()
    }

    pub fn creates(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Create(n) => Some(n),
                _ => None,
            })
            .collect()
    }

    pub fn deletes(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Delete(n) => Some(n),
                _ => None,
            })
            .collect()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }
}

fn take_failure(counter: &mut usize) -> bool {
    if *counter > 0 {
        *counter -= 1;
        true
    } else {
        false
    }
}

#[async_trait::async_trait]
impl DirectoryClient for MockDirectory {
    async fn list_resources(&self, filter: Option<&str>) -> DirectoryResult<Vec<Resource>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::ListResources);
        if take_failure(&mut state.fail_list_resources) {
            return Err(DirectoryError::RequestFailed("connection refused".into()));
        }
        Ok(state
            .hosts
            .iter()
            .filter(|h| filter.is_none() || !state.excluded.contains(*h))
            .map(|h| Resource::new(h.as_str()))
            .collect())
    }

    async fn get_resource(
        &self,
        name: &str,
        filter: Option<&str>,
    ) -> DirectoryResult<Option<Resource>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::GetResource(name.to_string()));
        if state.fail_get.contains(name) {
            return Err(DirectoryError::RequestFailed("timeout".into()));
        }
        let visible = state.hosts.contains(name)
            && (filter.is_none() || !state.excluded.contains(name));
        Ok(visible.then(|| Resource::new(name)))
    }

    async fn list_credentials(&self) -> DirectoryResult<Vec<Credential>> {
        let panic = {
            let mut state = self.state.lock().unwrap();
            state.calls.push(Call::ListCredentials);
            state.panic_list_credentials
        };
        if panic {
            panic!("list_credentials blew up");
        }
        let mut state = self.state.lock().unwrap();
        if take_failure(&mut state.fail_list_credentials) {
            return Err(DirectoryError::RequestFailed("connection refused".into()));
        }
        Ok(state.credentials.iter().map(|c| Credential::new(c.as_str())).collect())
    }

    async fn create_credential(&self, name: &str, _spec: &CredentialSpec) -> DirectoryResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Create(name.to_string()));
        if state.fail_create.contains(name) {
            return Err(DirectoryError::RequestFailed("500: internal error".into()));
        }
        if !state.credentials.insert(name.to_string()) {
            return Err(DirectoryError::RequestFailed("500: object already exists".into()));
        }
        Ok(())
    }

    async fn delete_credential(&self, name: &str) -> DirectoryResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Delete(name.to_string()));
        if state.fail_delete.contains(name) {
            return Err(DirectoryError::RequestFailed("500: internal error".into()));
        }
        if !state.credentials.remove(name) {
            return Err(DirectoryError::NotFound(name.to_string()));
        }
        Ok(())
    }

    async fn subscribe(&self, _subscription: &Subscription) -> DirectoryResult<EventStream> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Subscribe);
        if take_failure(&mut state.fail_subscribe) {
            return Err(DirectoryError::RequestFailed("503: unavailable".into()));
        }
        match state.streams.pop_front() {
            Some(rx) => Ok(Box::pin(UnboundedReceiverStream::new(rx))),
            None => Ok(Box::pin(futures::stream::pending::<DirectoryResult<Event>>())),
        }
    }
}

pub fn manager(mock: &Arc<MockDirectory>) -> CredentialManager {
    CredentialManager::new(mock.clone(), PREFIX, CredentialTemplate::default())
}

pub fn created(name: &str) -> DirectoryResult<Event> {
    Ok(Event::created(HOST_TYPE, name))
}

pub fn deleted(name: &str) -> DirectoryResult<Event> {
    Ok(Event::deleted(HOST_TYPE, name))
}
