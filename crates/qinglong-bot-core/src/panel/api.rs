//! Typed panel operations over the cached gateway.

use super::gateway::CachedGateway;
use super::models::{
    Cron, Dependency, DependencyKind, EnvVar, NewDependency, NewSubscription, ScriptNode,
    Subscription,
};
use super::resources::{deps_key, scripts_tree_key, task_detail_key, ResourceClass};
use super::{ApiResponse, HttpMethod, PanelError};
use crate::cache::PartitionKey;
use crate::config::PanelSettings;
use serde_json::{json, Map, Value};

/// Task state switches the panel exposes as `PUT /open/crons/{verb}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CronCommand {
    /// Start a run now
    Run,
    /// Kill the running instance
    Stop,
    /// Resume scheduling
    Enable,
    /// Pause scheduling
    Disable,
}

impl CronCommand {
    const fn endpoint(self) -> &'static str {
        match self {
            Self::Run => "/open/crons/run",
            Self::Stop => "/open/crons/stop",
            Self::Enable => "/open/crons/enable",
            Self::Disable => "/open/crons/disable",
        }
    }
}

/// Subscription switches the panel exposes as `PUT /open/subscriptions/{verb}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubCommand {
    /// Pull now
    Run,
    /// Resume scheduled pulls
    Enable,
    /// Pause scheduled pulls
    Disable,
}

impl SubCommand {
    const fn endpoint(self) -> &'static str {
        match self {
            Self::Run => "/open/subscriptions/run",
            Self::Enable => "/open/subscriptions/enable",
            Self::Disable => "/open/subscriptions/disable",
        }
    }
}

/// Resource-level panel API.
///
/// Reads are cached per conversation; every write invalidates the
/// resource class it touches. Failure envelopes surface as
/// [`PanelError::DownstreamRejected`].
#[derive(Clone)]
pub struct PanelApi {
    gateway: CachedGateway,
    settings: PanelSettings,
}

impl PanelApi {
    /// Wrap a gateway; `settings` supplies the per-class TTLs.
    #[must_use]
    pub const fn new(gateway: CachedGateway, settings: PanelSettings) -> Self {
        Self { gateway, settings }
    }

    /// Drops every cached entry of one conversation.
    pub async fn clear_cache(&self, chat_id: PartitionKey) {
        self.gateway.cache().partition(chat_id).clear_prefix("").await;
    }

    /// Drops one resource class of one conversation.
    pub async fn clear_class(&self, chat_id: PartitionKey, class: ResourceClass) {
        self.gateway
            .cache()
            .partition(chat_id)
            .clear_prefix(class.prefix())
            .await;
    }

    async fn read_class(
        &self,
        chat_id: PartitionKey,
        class: ResourceClass,
        endpoint: &str,
        cache_key: &str,
    ) -> Result<ApiResponse, PanelError> {
        self.gateway
            .read(chat_id, endpoint, cache_key, class.ttl(&self.settings))
            .await?
            .into_result()
    }

    async fn write(
        &self,
        chat_id: PartitionKey,
        class: ResourceClass,
        method: HttpMethod,
        endpoint: &str,
        body: Value,
    ) -> Result<(), PanelError> {
        self.gateway
            .write(chat_id, method, endpoint, Some(body), class.prefix())
            .await?
            .into_result()
            .map(|_| ())
    }

    // Scheduled tasks

    /// All scheduled tasks.
    ///
    /// # Errors
    ///
    /// Gateway failures and failure envelopes.
    pub async fn crons(&self, chat_id: PartitionKey) -> Result<Vec<Cron>, PanelError> {
        let class = ResourceClass::Tasks;
        Ok(self
            .read_class(chat_id, class, "/open/crons", &class.list_key())
            .await?
            .items())
    }

    /// One scheduled task, `None` when the panel does not know it.
    ///
    /// # Errors
    ///
    /// Gateway failures.
    pub async fn cron(&self, chat_id: PartitionKey, id: u64) -> Result<Option<Cron>, PanelError> {
        let response = self
            .gateway
            .read(
                chat_id,
                &format!("/open/crons/{id}"),
                &task_detail_key(id),
                ResourceClass::Tasks.ttl(&self.settings),
            )
            .await?;
        Ok(response.object())
    }

    /// Latest log output of a task, always fetched live.
    ///
    /// # Errors
    ///
    /// Gateway failures and failure envelopes.
    pub async fn cron_log(&self, id: u64) -> Result<Option<String>, PanelError> {
        let response = self
            .gateway
            .read_fresh(&format!("/open/crons/{id}/log"))
            .await?
            .into_result()?;
        Ok(match response.data {
            Value::String(log) if !log.is_empty() => Some(log),
            Value::Null | Value::String(_) => None,
            other => Some(other.to_string()),
        })
    }

    /// Flips a task's run or schedule state.
    ///
    /// # Errors
    ///
    /// Gateway failures and failure envelopes.
    pub async fn cron_command(
        &self,
        chat_id: PartitionKey,
        command: CronCommand,
        id: u64,
    ) -> Result<(), PanelError> {
        self.write(chat_id, ResourceClass::Tasks, HttpMethod::Put, command.endpoint(), json!([id]))
            .await
    }

    /// Deletes a task.
    ///
    /// # Errors
    ///
    /// Gateway failures and failure envelopes.
    pub async fn delete_cron(&self, chat_id: PartitionKey, id: u64) -> Result<(), PanelError> {
        self.write(chat_id, ResourceClass::Tasks, HttpMethod::Delete, "/open/crons", json!([id]))
            .await
    }

    /// Replaces a task's schedule.
    ///
    /// # Errors
    ///
    /// Gateway failures and failure envelopes.
    pub async fn update_cron_schedule(
        &self,
        chat_id: PartitionKey,
        id: u64,
        schedule: &str,
    ) -> Result<(), PanelError> {
        let body = json!({"id": id, "schedule": schedule});
        self.write(chat_id, ResourceClass::Tasks, HttpMethod::Put, "/open/crons", body)
            .await
    }

    /// Creates a task.
    ///
    /// # Errors
    ///
    /// Gateway failures and failure envelopes.
    pub async fn create_cron(
        &self,
        chat_id: PartitionKey,
        name: &str,
        command: &str,
        schedule: &str,
    ) -> Result<(), PanelError> {
        let body = json!({"name": name, "command": command, "schedule": schedule});
        self.write(chat_id, ResourceClass::Tasks, HttpMethod::Post, "/open/crons", body)
            .await
    }

    // Environment entries

    /// All environment entries.
    ///
    /// # Errors
    ///
    /// Gateway failures and failure envelopes.
    pub async fn envs(&self, chat_id: PartitionKey) -> Result<Vec<EnvVar>, PanelError> {
        let class = ResourceClass::Envs;
        Ok(self
            .read_class(chat_id, class, "/open/envs", &class.list_key())
            .await?
            .items())
    }

    /// One environment entry, resolved from the cached list.
    ///
    /// # Errors
    ///
    /// Gateway failures and failure envelopes.
    pub async fn env(&self, chat_id: PartitionKey, id: u64) -> Result<Option<EnvVar>, PanelError> {
        Ok(self.envs(chat_id).await?.into_iter().find(|e| e.id == id))
    }

    /// Enables or disables an entry.
    ///
    /// # Errors
    ///
    /// Gateway failures and failure envelopes.
    pub async fn set_env_enabled(
        &self,
        chat_id: PartitionKey,
        id: u64,
        enabled: bool,
    ) -> Result<(), PanelError> {
        let endpoint = if enabled {
            "/open/envs/enable"
        } else {
            "/open/envs/disable"
        };
        self.write(chat_id, ResourceClass::Envs, HttpMethod::Put, endpoint, json!([id]))
            .await
    }

    /// Deletes an entry.
    ///
    /// # Errors
    ///
    /// Gateway failures and failure envelopes.
    pub async fn delete_env(&self, chat_id: PartitionKey, id: u64) -> Result<(), PanelError> {
        self.write(chat_id, ResourceClass::Envs, HttpMethod::Delete, "/open/envs", json!([id]))
            .await
    }

    /// Creates an entry.
    ///
    /// # Errors
    ///
    /// Gateway failures and failure envelopes.
    pub async fn create_env(
        &self,
        chat_id: PartitionKey,
        name: &str,
        value: &str,
    ) -> Result<(), PanelError> {
        let body = json!([{"name": name, "value": value}]);
        self.write(chat_id, ResourceClass::Envs, HttpMethod::Post, "/open/envs", body)
            .await
    }

    /// Rewrites an entry's name and value.
    ///
    /// # Errors
    ///
    /// Gateway failures and failure envelopes.
    pub async fn update_env(
        &self,
        chat_id: PartitionKey,
        id: u64,
        name: &str,
        value: &str,
    ) -> Result<(), PanelError> {
        let body = json!({"id": id, "name": name, "value": value});
        self.write(chat_id, ResourceClass::Envs, HttpMethod::Put, "/open/envs", body)
            .await
    }

    // Subscriptions

    async fn subscription_records(
        &self,
        chat_id: PartitionKey,
    ) -> Result<Vec<Map<String, Value>>, PanelError> {
        let class = ResourceClass::Subs;
        Ok(self
            .read_class(chat_id, class, "/open/subscriptions", &class.list_key())
            .await?
            .items())
    }

    /// All subscriptions.
    ///
    /// # Errors
    ///
    /// Gateway failures and failure envelopes.
    pub async fn subscriptions(
        &self,
        chat_id: PartitionKey,
    ) -> Result<Vec<Subscription>, PanelError> {
        let class = ResourceClass::Subs;
        Ok(self
            .read_class(chat_id, class, "/open/subscriptions", &class.list_key())
            .await?
            .items())
    }

    /// One subscription, resolved from the cached list.
    ///
    /// # Errors
    ///
    /// Gateway failures and failure envelopes.
    pub async fn subscription(
        &self,
        chat_id: PartitionKey,
        id: u64,
    ) -> Result<Option<Subscription>, PanelError> {
        Ok(self
            .subscriptions(chat_id)
            .await?
            .into_iter()
            .find(|s| s.id == id))
    }

    /// The panel's full record of one subscription, as needed for updates.
    ///
    /// # Errors
    ///
    /// Gateway failures and failure envelopes.
    pub async fn subscription_record(
        &self,
        chat_id: PartitionKey,
        id: u64,
    ) -> Result<Option<Map<String, Value>>, PanelError> {
        Ok(self
            .subscription_records(chat_id)
            .await?
            .into_iter()
            .find(|record| record.get("id").and_then(Value::as_u64) == Some(id)))
    }

    /// Runs, enables or disables a subscription.
    ///
    /// # Errors
    ///
    /// Gateway failures and failure envelopes.
    pub async fn sub_command(
        &self,
        chat_id: PartitionKey,
        command: SubCommand,
        id: u64,
    ) -> Result<(), PanelError> {
        self.write(chat_id, ResourceClass::Subs, HttpMethod::Put, command.endpoint(), json!([id]))
            .await
    }

    /// Deletes a subscription.
    ///
    /// # Errors
    ///
    /// Gateway failures and failure envelopes.
    pub async fn delete_subscription(
        &self,
        chat_id: PartitionKey,
        id: u64,
    ) -> Result<(), PanelError> {
        let endpoint = "/open/subscriptions";
        self.write(chat_id, ResourceClass::Subs, HttpMethod::Delete, endpoint, json!([id]))
            .await
    }

    /// Creates a subscription.
    ///
    /// # Errors
    ///
    /// Gateway failures and failure envelopes.
    pub async fn create_subscription(
        &self,
        chat_id: PartitionKey,
        subscription: &NewSubscription,
    ) -> Result<(), PanelError> {
        let body = json!(subscription);
        self.write(chat_id, ResourceClass::Subs, HttpMethod::Post, "/open/subscriptions", body)
            .await
    }

    /// Replaces a subscription with `record`.
    ///
    /// # Errors
    ///
    /// Gateway failures and failure envelopes.
    pub async fn update_subscription(
        &self,
        chat_id: PartitionKey,
        record: Map<String, Value>,
    ) -> Result<(), PanelError> {
        let body = Value::Object(record);
        self.write(chat_id, ResourceClass::Subs, HttpMethod::Put, "/open/subscriptions", body)
            .await
    }

    // Dependencies

    /// Dependencies of one kind.
    ///
    /// # Errors
    ///
    /// Gateway failures and failure envelopes.
    pub async fn dependencies(
        &self,
        chat_id: PartitionKey,
        kind: DependencyKind,
    ) -> Result<Vec<Dependency>, PanelError> {
        let endpoint = format!("/open/dependencies?type={}", kind.as_str());
        Ok(self
            .read_class(chat_id, ResourceClass::Deps, &endpoint, &deps_key(kind))
            .await?
            .items())
    }

    /// Reinstalls a dependency.
    ///
    /// # Errors
    ///
    /// Gateway failures and failure envelopes.
    pub async fn reinstall_dependency(
        &self,
        chat_id: PartitionKey,
        id: u64,
    ) -> Result<(), PanelError> {
        let endpoint = "/open/dependencies/reinstall";
        self.write(chat_id, ResourceClass::Deps, HttpMethod::Put, endpoint, json!([id]))
            .await
    }

    /// Removes a dependency.
    ///
    /// # Errors
    ///
    /// Gateway failures and failure envelopes.
    pub async fn delete_dependency(&self, chat_id: PartitionKey, id: u64) -> Result<(), PanelError> {
        let endpoint = "/open/dependencies";
        self.write(chat_id, ResourceClass::Deps, HttpMethod::Delete, endpoint, json!([id]))
            .await
    }

    /// Queues installation of `names`.
    ///
    /// # Errors
    ///
    /// Gateway failures and failure envelopes.
    pub async fn add_dependencies(
        &self,
        chat_id: PartitionKey,
        kind: DependencyKind,
        names: &[String],
    ) -> Result<(), PanelError> {
        let body: Vec<NewDependency> = names
            .iter()
            .map(|name| NewDependency {
                name: name.clone(),
                kind: kind.type_code(),
            })
            .collect();
        self.write(
            chat_id,
            ResourceClass::Deps,
            HttpMethod::Post,
            "/open/dependencies",
            json!(body),
        )
        .await
    }

    // Scripts

    /// The whole script tree.
    ///
    /// # Errors
    ///
    /// Gateway failures and failure envelopes.
    pub async fn script_tree(&self, chat_id: PartitionKey) -> Result<Vec<ScriptNode>, PanelError> {
        Ok(self
            .read_class(chat_id, ResourceClass::Scripts, "/open/scripts", &scripts_tree_key())
            .await?
            .items())
    }

    /// Stores a script under `folder` (`""` for the root).
    ///
    /// # Errors
    ///
    /// Gateway failures and failure envelopes.
    pub async fn upload_script(
        &self,
        chat_id: PartitionKey,
        file_name: &str,
        content: &str,
        folder: &str,
    ) -> Result<(), PanelError> {
        let body = json!({"filename": file_name, "content": content, "path": folder});
        self.write(chat_id, ResourceClass::Scripts, HttpMethod::Post, "/open/scripts", body)
            .await
    }

    /// Deletes a script.
    ///
    /// # Errors
    ///
    /// Gateway failures and failure envelopes.
    pub async fn delete_script(
        &self,
        chat_id: PartitionKey,
        file_name: &str,
        folder: &str,
    ) -> Result<(), PanelError> {
        let body = json!({"filename": file_name, "path": folder});
        self.write(chat_id, ResourceClass::Scripts, HttpMethod::Delete, "/open/scripts", body)
            .await
    }
}
