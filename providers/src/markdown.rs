//! A repository-local provider that reads and writes a single markdown
//! file (`.tasks.md` by default): one `##` heading per list, one checkbox
//! line per task. Metadata that doesn't fit the checkbox syntax (ids,
//! priority, dates, tags) rides along in a trailing HTML comment so the
//! file still reads naturally in a plain markdown viewer.
//!
//! Registers at a low detection priority: when a project carries its own
//! `.tasks.md`, that almost certainly beats falling through to the
//! embedded cache.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use tokio::sync::Mutex;

use tasktool_contract::{Detectable, TaskManager};
use tasktool_domain::{
    new_local_id, BackendId, Context, Priority, Task, TaskDraft, TaskError, TaskList,
    TaskListDraft, TaskResult, TaskStatus,
};

/// Filesystem-context providers win over the cache when present, so they
/// sit near the front of the priority order (lower sorts first).
pub const MARKDOWN_DETECTION_PRIORITY: u32 = 10;

pub const DEFAULT_FILE_NAME: &str = ".tasks.md";

struct Document {
    lists: Vec<TaskList>,
    tasks: HashMap<String, Vec<Task>>,
}

impl Document {
    fn empty() -> Self {
        Document {
            lists: Vec::new(),
            tasks: HashMap::new(),
        }
    }
}

/// Backend reading and writing a single markdown file as its entire store.
pub struct MarkdownProvider {
    backend_id: BackendId,
    path: PathBuf,
    doc: Arc<Mutex<Document>>,
}

impl MarkdownProvider {
    pub fn open(backend_id: BackendId, path: impl AsRef<Path>) -> TaskResult<Self> {
        let path = path.as_ref().to_path_buf();
        let doc = if path.exists() {
            let text = std::fs::read_to_string(&path)?;
            parse_document(&text, backend_id.as_str())?
        } else {
            Document::empty()
        };
        Ok(MarkdownProvider {
            backend_id,
            path,
            doc: Arc::new(Mutex::new(doc)),
        })
    }

    pub fn default_path() -> PathBuf {
        PathBuf::from(DEFAULT_FILE_NAME)
    }

    async fn persist(&self, doc: &Document) -> TaskResult<()> {
        let text = render_document(doc);
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.path, text)?;
        tracing::debug!(backend = %self.backend_id, path = %self.path.display(), "rewrote task file");
        Ok(())
    }
}

#[async_trait]
impl TaskManager for MarkdownProvider {
    fn backend_id(&self) -> &BackendId {
        &self.backend_id
    }

    async fn get_lists(&self, ctx: &Context) -> TaskResult<Vec<TaskList>> {
        ctx.check()?;
        Ok(self
            .doc
            .lock()
            .await
            .lists
            .iter()
            .filter(|l| l.is_active())
            .cloned()
            .collect())
    }

    async fn get_list(&self, ctx: &Context, id: &str) -> TaskResult<Option<TaskList>> {
        ctx.check()?;
        Ok(self.doc.lock().await.lists.iter().find(|l| l.id == id).cloned())
    }

    async fn get_list_by_name(&self, ctx: &Context, name: &str) -> TaskResult<Option<TaskList>> {
        ctx.check()?;
        Ok(self
            .doc
            .lock()
            .await
            .lists
            .iter()
            .find(|l| l.is_active() && l.name_matches(name))
            .cloned())
    }

    async fn create_list(&self, ctx: &Context, draft: TaskListDraft) -> TaskResult<TaskList> {
        ctx.check()?;
        let mut doc = self.doc.lock().await;
        if doc.lists.iter().any(|l| l.is_active() && l.name_matches(&draft.name)) {
            return Err(TaskError::already_exists(format!(
                "list named '{}' already exists",
                draft.name
            )));
        }
        let list = TaskList::from_draft(new_local_id(), self.backend_id.as_str(), draft)?;
        doc.lists.push(list.clone());
        doc.tasks.insert(list.id.clone(), Vec::new());
        self.persist(&doc).await?;
        Ok(list)
    }

    async fn update_list(&self, ctx: &Context, list: TaskList) -> TaskResult<TaskList> {
        ctx.check()?;
        let mut doc = self.doc.lock().await;
        match doc.lists.iter_mut().find(|l| l.id == list.id) {
            Some(existing) => *existing = list.clone(),
            None => doc.lists.push(list.clone()),
        }
        doc.tasks.entry(list.id.clone()).or_default();
        self.persist(&doc).await?;
        Ok(list)
    }

    async fn delete_list(&self, ctx: &Context, id: &str) -> TaskResult<()> {
        ctx.check()?;
        let mut doc = self.doc.lock().await;
        let list = doc
            .lists
            .iter_mut()
            .find(|l| l.id == id)
            .ok_or_else(|| TaskError::not_found(format!("list {id} not found")))?;
        list.soft_delete();
        self.persist(&doc).await?;
        Ok(())
    }

    async fn get_deleted_lists(&self, ctx: &Context) -> TaskResult<Vec<TaskList>> {
        ctx.check()?;
        Ok(self
            .doc
            .lock()
            .await
            .lists
            .iter()
            .filter(|l| !l.is_active())
            .cloned()
            .collect())
    }

    async fn get_deleted_list_by_name(&self, ctx: &Context, name: &str) -> TaskResult<Option<TaskList>> {
        ctx.check()?;
        Ok(self
            .doc
            .lock()
            .await
            .lists
            .iter()
            .find(|l| !l.is_active() && l.name_matches(name))
            .cloned())
    }

    async fn restore_list(&self, ctx: &Context, id: &str) -> TaskResult<TaskList> {
        ctx.check()?;
        let mut doc = self.doc.lock().await;
        let list = doc
            .lists
            .iter_mut()
            .find(|l| l.id == id)
            .ok_or_else(|| TaskError::not_found(format!("list {id} not found")))?;
        list.restore();
        let restored = list.clone();
        self.persist(&doc).await?;
        Ok(restored)
    }

    async fn purge_list(&self, ctx: &Context, id: &str) -> TaskResult<()> {
        ctx.check()?;
        let mut doc = self.doc.lock().await;
        doc.lists.retain(|l| l.id != id);
        doc.tasks.remove(id);
        self.persist(&doc).await?;
        Ok(())
    }

    async fn get_tasks(&self, ctx: &Context, list_id: &str) -> TaskResult<Vec<Task>> {
        ctx.check()?;
        Ok(self.doc.lock().await.tasks.get(list_id).cloned().unwrap_or_default())
    }

    async fn get_task(&self, ctx: &Context, list_id: &str, task_id: &str) -> TaskResult<Option<Task>> {
        ctx.check()?;
        Ok(self
            .doc
            .lock()
            .await
            .tasks
            .get(list_id)
            .and_then(|tasks| tasks.iter().find(|t| t.id == task_id).cloned()))
    }

    async fn create_task(&self, ctx: &Context, list_id: &str, draft: TaskDraft) -> TaskResult<Task> {
        ctx.check()?;
        let mut doc = self.doc.lock().await;
        if !doc.lists.iter().any(|l| l.id == list_id) {
            return Err(TaskError::not_found(format!("list {list_id} not found")));
        }
        let mut draft = draft;
        draft.list_id = list_id.to_string();
        let task = Task::from_draft(new_local_id(), self.backend_id.as_str(), draft)?;
        doc.tasks.entry(list_id.to_string()).or_default().push(task.clone());
        self.persist(&doc).await?;
        Ok(task)
    }

    async fn update_task(&self, ctx: &Context, list_id: &str, task: Task) -> TaskResult<Task> {
        ctx.check()?;
        let mut doc = self.doc.lock().await;
        let tasks = doc.tasks.entry(list_id.to_string()).or_default();
        match tasks.iter_mut().find(|t| t.id == task.id) {
            Some(existing) => *existing = task.clone(),
            None => tasks.push(task.clone()),
        }
        self.persist(&doc).await?;
        Ok(task)
    }

    async fn delete_task(&self, ctx: &Context, list_id: &str, task_id: &str) -> TaskResult<()> {
        ctx.check()?;
        let mut doc = self.doc.lock().await;
        if let Some(tasks) = doc.tasks.get_mut(list_id) {
            tasks.retain(|t| t.id != task_id);
        }
        self.persist(&doc).await?;
        Ok(())
    }

    async fn close(&self) -> TaskResult<()> {
        Ok(())
    }
}

#[async_trait]
impl Detectable for MarkdownProvider {
    /// Read-only: existence of the file is the whole signal, no directory
    /// gets created the way the cache's fallback detection does.
    async fn can_detect(&self, _ctx: &Context) -> TaskResult<bool> {
        Ok(self.path.exists())
    }

    fn detection_info(&self) -> String {
        format!("markdown task file at {}", self.path.display())
    }

    fn detection_priority(&self) -> u32 {
        MARKDOWN_DETECTION_PRIORITY
    }
}

fn metadata_regex() -> Regex {
    Regex::new(r"<!--\s*(.*?)\s*-->").expect("static pattern")
}

fn parse_kv(raw: &str) -> HashMap<String, String> {
    raw.split_whitespace()
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn parse_document(text: &str, backend_id: &str) -> TaskResult<Document> {
    let meta_re = metadata_regex();
    let mut doc = Document::empty();
    let mut current_list_id: Option<String> = None;

    for raw_line in text.lines() {
        let line = raw_line.trim_end();
        if let Some(heading) = line.strip_prefix("## ") {
            let meta = meta_re
                .captures(heading)
                .map(|c| parse_kv(&c[1]))
                .unwrap_or_default();
            let name = meta_re.replace(heading, "").trim().to_string();
            let id = meta.get("id").cloned().unwrap_or_else(new_local_id);
            let modified_at = meta
                .get("modified")
                .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
                .map(|d| d.with_timezone(&Utc))
                .unwrap_or_else(Utc::now);
            let deleted_at = meta
                .get("deleted")
                .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
                .map(|d| d.with_timezone(&Utc));
            doc.lists.push(TaskList {
                id: id.clone(),
                backend_id: backend_id.to_string(),
                name,
                color: meta.get("color").cloned(),
                description: None,
                modified_at,
                deleted_at,
            });
            doc.tasks.entry(id.clone()).or_default();
            current_list_id = Some(id);
            continue;
        }

        let Some(list_id) = current_list_id.clone() else {
            continue;
        };
        let checked = if line.trim_start().starts_with("- [x]") {
            true
        } else if line.trim_start().starts_with("- [ ]") {
            false
        } else {
            continue;
        };
        let after_box = line.trim_start()[5..].trim();
        let meta = meta_re.captures(after_box).map(|c| parse_kv(&c[1])).unwrap_or_default();
        let summary = meta_re.replace(after_box, "").trim().to_string();

        let id = meta.get("id").cloned().unwrap_or_else(new_local_id);
        let priority = meta
            .get("priority")
            .and_then(|v| v.parse::<u8>().ok())
            .and_then(|v| Priority::new(v).ok())
            .unwrap_or_default();
        let status = if checked {
            TaskStatus::Completed
        } else {
            meta.get("status")
                .and_then(|v| v.parse().ok())
                .unwrap_or(TaskStatus::NeedsAction)
        };
        let due_date = meta.get("due").and_then(|v| NaiveDate::parse_from_str(v, "%Y-%m-%d").ok());
        let start_date = meta.get("start").and_then(|v| NaiveDate::parse_from_str(v, "%Y-%m-%d").ok());
        let completed_at = meta
            .get("completed")
            .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
            .map(|d| d.with_timezone(&Utc));
        let created_at = meta
            .get("created")
            .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);
        let modified_at = meta
            .get("modified")
            .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or(created_at);
        let tags = meta
            .get("tags")
            .map(|v| v.split(',').map(str::to_string).collect())
            .unwrap_or_default();

        doc.tasks.entry(list_id.clone()).or_default().push(Task {
            id,
            backend_id: backend_id.to_string(),
            list_id,
            parent_id: meta.get("parent").cloned(),
            summary,
            description: None,
            status,
            priority,
            due_date,
            start_date,
            completed_at,
            created_at,
            modified_at,
            tags,
        });
    }

    Ok(doc)
}

fn render_document(doc: &Document) -> String {
    let mut out = String::new();
    for list in &doc.lists {
        let mut meta = format!("id={} modified={}", list.id, list.modified_at.to_rfc3339());
        if let Some(deleted_at) = list.deleted_at {
            meta.push_str(&format!(" deleted={}", deleted_at.to_rfc3339()));
        }
        if let Some(color) = &list.color {
            meta.push_str(&format!(" color={color}"));
        }
        out.push_str(&format!("## {} <!-- list {meta} -->\n\n", list.name));

        for task in doc.tasks.get(&list.id).map(Vec::as_slice).unwrap_or_default() {
            let mark = if task.status == TaskStatus::Completed { "x" } else { " " };
            let mut meta = format!(
                "id={} created={} modified={}",
                task.id,
                task.created_at.to_rfc3339(),
                task.modified_at.to_rfc3339()
            );
            if !task.priority.is_unset() {
                meta.push_str(&format!(" priority={}", task.priority.get()));
            }
            if task.status != TaskStatus::Completed {
                meta.push_str(&format!(" status={}", task.status.as_str()));
            }
            if let Some(due) = task.due_date {
                meta.push_str(&format!(" due={}", due.format("%Y-%m-%d")));
            }
            if let Some(start) = task.start_date {
                meta.push_str(&format!(" start={}", start.format("%Y-%m-%d")));
            }
            if let Some(completed_at) = task.completed_at {
                meta.push_str(&format!(" completed={}", completed_at.to_rfc3339()));
            }
            if let Some(parent_id) = &task.parent_id {
                meta.push_str(&format!(" parent={parent_id}"));
            }
            if !task.tags.is_empty() {
                meta.push_str(&format!(" tags={}", task.tags));
            }
            out.push_str(&format!("- [{mark}] {} <!-- {meta} -->\n", task.summary));
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn provider(dir: &tempfile::TempDir) -> MarkdownProvider {
        MarkdownProvider::open(BackendId::new("notes").unwrap(), dir.path().join(".tasks.md")).unwrap()
    }

    #[tokio::test]
    async fn create_list_and_task_round_trip_through_reopen() {
        let dir = tempdir().unwrap();
        let ctx = Context::background();
        {
            let p = provider(&dir);
            let list = p.create_list(&ctx, TaskListDraft::new("Inbox")).await.unwrap();
            p.create_task(&ctx, &list.id, TaskDraft::new(&list.id, "buy milk"))
                .await
                .unwrap();
        }

        // reopen from disk: the file is the only state
        let reopened = MarkdownProvider::open(BackendId::new("notes").unwrap(), dir.path().join(".tasks.md")).unwrap();
        let lists = reopened.get_lists(&ctx).await.unwrap();
        assert_eq!(lists.len(), 1);
        let tasks = reopened.get_tasks(&ctx, &lists[0].id).await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].summary, "buy milk");
    }

    #[tokio::test]
    async fn completed_checkbox_round_trips_status() {
        let dir = tempdir().unwrap();
        let ctx = Context::background();
        let p = provider(&dir);
        let list = p.create_list(&ctx, TaskListDraft::new("Inbox")).await.unwrap();
        let mut task = p
            .create_task(&ctx, &list.id, TaskDraft::new(&list.id, "ship it"))
            .await
            .unwrap();
        task.set_status(TaskStatus::Completed);
        p.update_task(&ctx, &list.id, task.clone()).await.unwrap();

        let reopened = MarkdownProvider::open(BackendId::new("notes").unwrap(), dir.path().join(".tasks.md")).unwrap();
        let fetched = reopened.get_task(&ctx, &list.id, &task.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, TaskStatus::Completed);
        assert!(fetched.completed_at.is_some());
    }

    #[tokio::test]
    async fn soft_deleted_list_stays_in_trash_and_keeps_its_id_after_reopen() {
        let dir = tempdir().unwrap();
        let ctx = Context::background();
        let list_id = {
            let p = provider(&dir);
            let list = p.create_list(&ctx, TaskListDraft::new("Inbox")).await.unwrap();
            p.delete_list(&ctx, &list.id).await.unwrap();
            list.id
        };

        let reopened = MarkdownProvider::open(BackendId::new("notes").unwrap(), dir.path().join(".tasks.md")).unwrap();
        assert!(reopened.get_lists(&ctx).await.unwrap().is_empty());
        let deleted = reopened.get_deleted_lists(&ctx).await.unwrap();
        assert_eq!(deleted.len(), 1);
        assert_eq!(deleted[0].id, list_id);
    }

    #[tokio::test]
    async fn detects_only_when_file_exists() {
        let dir = tempdir().unwrap();
        let ctx = Context::background();
        let p = provider(&dir);
        assert!(!p.can_detect(&ctx).await.unwrap());
        p.create_list(&ctx, TaskListDraft::new("Inbox")).await.unwrap();
        assert!(p.can_detect(&ctx).await.unwrap());
        assert_eq!(p.detection_priority(), MARKDOWN_DETECTION_PRIORITY);
    }
}
