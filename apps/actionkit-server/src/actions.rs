//! Demo endpoints served by the binary: a small in-memory notes catalog.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use actionkit::{
    inventory, ActionBuilder, ActionDefinition, ActionRegistrator, AmbientKind, Annotation,
    BindingSpec, FnViews, RequestContext, ServiceProvider,
};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct Note {
    pub id: u64,
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewNote {
    pub title: String,
    #[serde(default)]
    pub body: String,
}

#[derive(Default)]
pub struct NoteStore {
    next_id: AtomicU64,
    notes: DashMap<u64, Note>,
}

impl NoteStore {
    pub fn insert(&self, new: NewNote) -> Note {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let note = Note {
            id,
            title: new.title,
            body: new.body,
        };
        self.notes.insert(id, note.clone());
        note
    }

    pub fn get(&self, id: u64) -> Option<Note> {
        self.notes.get(&id).map(|n| n.clone())
    }

    /// Notes whose title contains `q` (case-insensitive), ordered by id.
    pub fn search(&self, q: &str, limit: usize) -> Vec<Note> {
        let q = q.to_lowercase();
        let mut found: Vec<Note> = self
            .notes
            .iter()
            .filter(|n| n.title.to_lowercase().contains(&q))
            .map(|n| n.value().clone())
            .collect();
        found.sort_by_key(|n| n.id);
        found.truncate(limit);
        found
    }
}

pub fn services() -> ServiceProvider {
    let store = NoteStore::default();
    store.insert(NewNote {
        title: "Welcome".into(),
        body: "Notes are kept in memory.".into(),
    });
    ServiceProvider::new().with(Arc::new(store))
}

pub fn views() -> FnViews {
    FnViews::new().view("note", |model| {
        let title = model["title"].as_str().ok_or("note has no title")?;
        let body = model["body"].as_str().unwrap_or_default();
        Ok(format!("<article><h1>{title}</h1><p>{body}</p></article>"))
    })
}

fn health() -> ActionDefinition {
    ActionBuilder::get("/health")
        .ignore_api()
        .to(|| "ok")
        .build()
}

fn search_notes() -> ActionDefinition {
    ActionBuilder::get("/notes")
        .group_by("notes")
        .title("Search notes")
        .using(BindingSpec::service::<NoteStore>())
        .using(BindingSpec::query::<String>("q").with_default(String::new()))
        .using(BindingSpec::query::<usize>("limit").with_default(20usize))
        .to(|store: Arc<NoteStore>, q: String, limit: usize| store.search(&q, limit))
        .build()
}

fn get_note() -> ActionDefinition {
    ActionBuilder::get("/notes/{id:int}")
        .group_by("notes")
        .title("Get a note")
        .using(BindingSpec::service::<NoteStore>())
        .using(BindingSpec::route::<u64>("id"))
        .to(|store: Arc<NoteStore>, id: u64| store.get(id))
        .build()
}

fn create_note() -> ActionDefinition {
    ActionBuilder::post("/notes")
        .group_by("notes")
        .title("Create a note")
        .annotate(Annotation::custom("audit").with_property("action", serde_json::json!("create")))
        .using(BindingSpec::body::<NewNote>())
        .to(|mut new: NewNote| {
            new.title = new.title.trim().to_string();
            new
        })
        .using(BindingSpec::service::<NoteStore>())
        .using(BindingSpec::previous::<NewNote>())
        .to_async(|store: Arc<NoteStore>, new: NewNote| async move {
            let note = store.insert(new);
            tracing::info!(note_id = note.id, "note created");
            note
        })
        .build()
}

fn render_note() -> ActionDefinition {
    ActionBuilder::get("/notes/{id:int}/page")
        .group_by("notes")
        .description("HTML page for one note")
        .using(BindingSpec::service::<NoteStore>())
        .using(BindingSpec::route::<u64>("id"))
        .to(|store: Arc<NoteStore>, id: u64| {
            store.get(id).unwrap_or_else(|| Note {
                id,
                title: "Not found".into(),
                body: String::new(),
            })
        })
        .to_view("note")
        .build()
}

fn echo_request() -> ActionDefinition {
    ActionBuilder::get("/echo/{**rest}")
        .group_by("diagnostics")
        .using(BindingSpec::ambient(AmbientKind::Request))
        .to(|req: RequestContext| {
            serde_json::json!({
                "method": req.method.as_str(),
                "path": req.uri.path(),
                "route_values": req.route_values,
            })
        })
        .build()
}

inventory::submit! { ActionRegistrator(health) }
inventory::submit! { ActionRegistrator(search_notes) }
inventory::submit! { ActionRegistrator(get_note) }
inventory::submit! { ActionRegistrator(create_note) }
inventory::submit! { ActionRegistrator(render_note) }
inventory::submit! { ActionRegistrator(echo_request) }

#[cfg(test)]
mod tests {
    use super::*;
    use actionkit::{ActionCompiler, HandlerRegistry};

    #[test]
    fn every_demo_action_compiles() {
        let compiler = ActionCompiler::new().with_registry(Arc::new(HandlerRegistry::new()));
        let report = compiler.discover(None);
        assert!(report.is_success(), "{:?}", report.failures);
        assert_eq!(report.compiled.len(), 6);
    }

    #[test]
    fn search_is_case_insensitive_and_limited() {
        let store = NoteStore::default();
        for t in ["Alpha", "alphabet", "beta"] {
            store.insert(NewNote {
                title: t.into(),
                body: String::new(),
            });
        }
        let found = store.search("ALPHA", 10);
        assert_eq!(found.iter().map(|n| n.id).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(store.search("", 1).len(), 1);
    }
}
