#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use converge_core::core_types::OperationContext;
use converge_core::errors::{Error, ErrorKind, Result};
use converge_core::model::{
    OperationMethod, OperationStatus, OperationType, OutputResource, ProvisioningState,
    RecipeCapable, ResourceMetadata, ResourceModel, ResourceRecipe,
};
use converge_core::processors::{ProcessorOptions, ResourceProcessor};
use converge_core::queue::{InMemoryQueue, Message, OperationRequest, QueueClient};
use converge_core::recipes::{
    Configuration, ConfigurationLoader, DeleteOptions, EngineError, ExecuteOptions, RecipeEngine,
    RecipeMetadata, RecipeOutput,
};
use converge_engine::{
    Controller, ControllerOptions, ControllerRegistry, ControllerResult, CreateOrUpdateResource,
    DeleteResource, Request, Worker, WorkerOptions,
};
use converge_store::{DatabaseClient, InMemoryClient, Object, SaveOptions, StatusManager};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const RG: &str = "/planes/radius/local/resourceGroups/rg";
pub const REDIS_TYPE: &str = "Applications.Datastores/redisCaches";

pub fn redis_id(name: &str) -> String {
    format!("{}/providers/{}/{}", RG, REDIS_TYPE, name)
}

// ---------------------------------------------------------------------------
// Resource model
// ---------------------------------------------------------------------------

/// Recipe-capable resource used by the controller tests
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResource {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub provisioning_state: ProvisioningState,
    #[serde(default)]
    pub environment_id: String,
    #[serde(default)]
    pub application_id: String,
    #[serde(default)]
    pub output_resources: Vec<OutputResource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipe: Option<ResourceRecipe>,
    #[serde(default)]
    pub processed: bool,
}

impl TestResource {
    pub fn new(name: &str) -> Self {
        Self {
            id: redis_id(name),
            name: name.to_string(),
            environment_id: format!("{}/providers/Applications.Core/environments/env", RG),
            application_id: format!("{}/providers/Applications.Core/applications/app", RG),
            ..Default::default()
        }
    }

    pub fn with_recipe(mut self, name: &str) -> Self {
        let mut parameters = serde_json::Map::new();
        parameters.insert("port".to_string(), serde_json::json!(6379));
        self.recipe = Some(ResourceRecipe {
            name: name.to_string(),
            parameters,
            ..Default::default()
        });
        self
    }

    pub fn with_output(mut self, id: &str) -> Self {
        self.output_resources.push(OutputResource {
            id: id.to_string(),
            local_id: None,
            managed: true,
        });
        self
    }
}

impl ResourceModel for TestResource {
    fn id(&self) -> &str {
        &self.id
    }

    fn resource_metadata(&self) -> ResourceMetadata {
        ResourceMetadata {
            environment_id: self.environment_id.clone(),
            application_id: self.application_id.clone(),
        }
    }

    fn output_resources(&self) -> &[OutputResource] {
        &self.output_resources
    }

    fn provisioning_state(&self) -> ProvisioningState {
        self.provisioning_state
    }

    fn set_provisioning_state(&mut self, state: ProvisioningState) {
        self.provisioning_state = state;
    }

    fn recipe_capability(&self) -> Option<&dyn RecipeCapable> {
        Some(self)
    }

    fn recipe_capability_mut(&mut self) -> Option<&mut dyn RecipeCapable> {
        Some(self)
    }
}

impl RecipeCapable for TestResource {
    fn recipe(&self) -> Option<&ResourceRecipe> {
        self.recipe.as_ref()
    }

    fn recipe_mut(&mut self) -> Option<&mut ResourceRecipe> {
        self.recipe.as_mut()
    }
}

pub async fn seed_resource(db: &dyn DatabaseClient, resource: &TestResource) -> String {
    let mut obj = Object::from_model(&resource.id, resource).expect("encode resource");
    db.save(&mut obj, &SaveOptions::default())
        .await
        .expect("seed save");
    obj.metadata.etag
}

pub async fn load_resource(db: &dyn DatabaseClient, id: &str) -> (TestResource, String) {
    let obj = db.get(id).await.expect("load resource");
    let resource = obj.as_model().expect("decode resource");
    (resource, obj.metadata.etag)
}

// ---------------------------------------------------------------------------
// Recording collaborators
// ---------------------------------------------------------------------------

/// Recipe engine that records every call
#[derive(Default)]
pub struct RecordingEngine {
    pub executions: Mutex<Vec<ExecuteOptions>>,
    pub deletions: Mutex<Vec<DeleteOptions>>,
    execute_error: Option<EngineError>,
    delete_error: Option<EngineError>,
    output: RecipeOutput,
}

impl RecordingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_output(mut self, resources: &[&str]) -> Self {
        self.output.resources = resources.iter().map(|r| r.to_string()).collect();
        self
    }

    pub fn failing_execute(mut self, err: impl Into<EngineError>) -> Self {
        self.execute_error = Some(err.into());
        self
    }

    pub fn failing_delete(mut self, err: impl Into<EngineError>) -> Self {
        self.delete_error = Some(err.into());
        self
    }

    pub fn execution_count(&self) -> usize {
        self.executions.lock().unwrap().len()
    }

    pub fn deletion_count(&self) -> usize {
        self.deletions.lock().unwrap().len()
    }
}

#[async_trait]
impl RecipeEngine for RecordingEngine {
    async fn execute(
        &self,
        options: ExecuteOptions,
    ) -> std::result::Result<RecipeOutput, EngineError> {
        self.executions.lock().unwrap().push(options);
        match &self.execute_error {
            Some(err) => Err(err.clone()),
            None => Ok(self.output.clone()),
        }
    }

    async fn delete(&self, options: DeleteOptions) -> std::result::Result<(), EngineError> {
        self.deletions.lock().unwrap().push(options);
        match &self.delete_error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

/// Processor that marks resources as processed and copies recipe outputs
#[derive(Default)]
pub struct RecordingProcessor {
    pub processed: Mutex<Vec<ProcessorOptions>>,
    pub deleted: AtomicUsize,
    error: Option<Error>,
}

impl RecordingProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(err: Error) -> Self {
        Self {
            error: Some(err),
            ..Self::default()
        }
    }

    pub fn process_count(&self) -> usize {
        self.processed.lock().unwrap().len()
    }

    pub fn delete_count(&self) -> usize {
        self.deleted.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResourceProcessor<TestResource> for RecordingProcessor {
    async fn process(&self, resource: &mut TestResource, options: &ProcessorOptions) -> Result<()> {
        self.processed.lock().unwrap().push(options.clone());
        if let Some(err) = &self.error {
            return Err(err.clone());
        }
        resource.processed = true;
        if let Some(output) = &options.recipe_output {
            resource.output_resources = output
                .resources
                .iter()
                .map(|id| OutputResource {
                    id: id.clone(),
                    local_id: None,
                    managed: true,
                })
                .collect();
        }
        Ok(())
    }

    async fn delete(&self, _resource: &TestResource, _options: &ProcessorOptions) -> Result<()> {
        self.deleted.fetch_add(1, Ordering::SeqCst);
        match &self.error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

/// Configuration loader returning a fixed configuration
#[derive(Default)]
pub struct StaticConfigLoader {
    pub configuration: Configuration,
    pub requests: Mutex<Vec<RecipeMetadata>>,
}

impl StaticConfigLoader {
    pub fn simulated() -> Self {
        Self {
            configuration: Configuration {
                simulated: true,
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

#[async_trait]
impl ConfigurationLoader for StaticConfigLoader {
    async fn load_configuration(&self, metadata: &RecipeMetadata) -> Result<Configuration> {
        self.requests.lock().unwrap().push(metadata.clone());
        Ok(self.configuration.clone())
    }
}

/// Wiring for the generic controllers over [`TestResource`]
pub struct ControllerFixture {
    pub db: Arc<InMemoryClient>,
    pub engine: Arc<RecordingEngine>,
    pub processor: Arc<RecordingProcessor>,
    pub loader: Arc<StaticConfigLoader>,
}

impl ControllerFixture {
    pub fn new() -> Self {
        Self::with(
            RecordingEngine::new(),
            RecordingProcessor::new(),
            StaticConfigLoader::default(),
        )
    }

    pub fn with(
        engine: RecordingEngine,
        processor: RecordingProcessor,
        loader: StaticConfigLoader,
    ) -> Self {
        Self {
            db: Arc::new(InMemoryClient::new()),
            engine: Arc::new(engine),
            processor: Arc::new(processor),
            loader: Arc::new(loader),
        }
    }

    pub fn options(&self) -> ControllerOptions {
        ControllerOptions {
            database_client: self.db.clone(),
            resource_type: REDIS_TYPE.to_string(),
        }
    }

    pub fn create_or_update(&self) -> CreateOrUpdateResource<TestResource> {
        CreateOrUpdateResource::new(
            self.options(),
            self.processor.clone(),
            self.engine.clone(),
            self.loader.clone(),
        )
    }

    pub fn delete(&self) -> DeleteResource<TestResource> {
        DeleteResource::new(
            self.options(),
            self.processor.clone(),
            self.engine.clone(),
            self.loader.clone(),
        )
    }
}

pub fn request(resource_id: &str, method: OperationMethod) -> Request {
    Request {
        operation_id: Uuid::new_v4(),
        resource_id: resource_id.to_string(),
        operation_type: OperationType::new(REDIS_TYPE, method),
        context: OperationContext::new(),
        operation_timeout: Duration::from_secs(60),
        dequeue_count: 1,
    }
}

// ---------------------------------------------------------------------------
// Worker harness
// ---------------------------------------------------------------------------

type Respond = dyn Fn(&Request) -> Result<ControllerResult> + Send + Sync;

/// Controller that answers from a closure and tracks its own concurrency
pub struct ScriptedController {
    runs: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    delay: Duration,
    respond: Box<Respond>,
}

impl ScriptedController {
    pub fn new<F>(delay: Duration, respond: F) -> Arc<Self>
    where
        F: Fn(&Request) -> Result<ControllerResult> + Send + Sync + 'static,
    {
        Arc::new(Self {
            runs: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            delay,
            respond: Box::new(respond),
        })
    }

    pub fn succeeding() -> Arc<Self> {
        Self::new(Duration::ZERO, |_| Ok(ControllerResult::success()))
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Controller for ScriptedController {
    async fn run(&self, request: &Request) -> Result<ControllerResult> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        (self.respond)(request)
    }
}

/// Queue whose locks can never be extended, as if another worker took them
pub struct StolenLockQueue {
    pub inner: Arc<InMemoryQueue>,
    pub extend_calls: AtomicUsize,
}

impl StolenLockQueue {
    pub fn new(inner: Arc<InMemoryQueue>) -> Self {
        Self {
            inner,
            extend_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl QueueClient for StolenLockQueue {
    async fn enqueue(&self, request: OperationRequest) -> Result<String> {
        self.inner.enqueue(request).await
    }

    async fn lease(&self, max_count: usize, visibility: Duration) -> Result<Vec<Message>> {
        self.inner.lease(max_count, visibility).await
    }

    async fn extend(&self, _lock_token: &str, _duration: Duration) -> Result<DateTime<Utc>> {
        self.extend_calls.fetch_add(1, Ordering::SeqCst);
        Err(Error::new(ErrorKind::LockLost)
            .with_op("extend")
            .with_message("lock is held by another consumer"))
    }

    async fn complete(&self, lock_token: &str) -> Result<()> {
        self.inner.complete(lock_token).await
    }

    async fn abandon(&self, lock_token: &str) -> Result<()> {
        self.inner.abandon(lock_token).await
    }
}

/// Store, queue and status manager shared by a worker test
pub struct Harness {
    pub db: Arc<InMemoryClient>,
    pub queue: Arc<InMemoryQueue>,
    pub status: StatusManager,
}

impl Harness {
    pub fn new() -> Self {
        let db = Arc::new(InMemoryClient::new());
        let queue = Arc::new(InMemoryQueue::new());
        let status = StatusManager::new(db.clone(), queue.clone());
        Self { db, queue, status }
    }

    /// Registry with `controller` routed for `REDIS_TYPE|method`
    pub fn registry(
        &self,
        method: OperationMethod,
        controller: Arc<ScriptedController>,
    ) -> ControllerRegistry {
        let mut registry = ControllerRegistry::new(self.db.clone());
        registry
            .register(REDIS_TYPE, method, move |_| {
                Ok(controller as Arc<dyn Controller>)
            })
            .expect("register controller");
        registry
    }

    pub fn worker(&self, options: WorkerOptions, registry: ControllerRegistry) -> Worker {
        Worker::new(options, self.db.clone(), self.queue.clone(), Arc::new(registry))
    }

    pub fn worker_with_queue(
        &self,
        options: WorkerOptions,
        registry: ControllerRegistry,
        queue: Arc<dyn QueueClient>,
    ) -> Worker {
        Worker::new(options, self.db.clone(), queue, Arc::new(registry))
    }

    /// Seed a plain resource record
    pub async fn seed(&self, name: &str) -> String {
        let id = redis_id(name);
        let mut obj = Object::new(
            &id,
            serde_json::json!({"name": name, "provisioningState": "Accepted", "properties": {}}),
        );
        self.db
            .save(&mut obj, &SaveOptions::default())
            .await
            .expect("seed resource");
        id
    }

    /// Persist an `Accepted` status and enqueue the operation
    pub async fn queue_operation(&self, resource_id: &str, operation_type: &str) -> OperationRequest {
        let request = OperationRequest::new(Uuid::new_v4(), resource_id, operation_type);
        self.status
            .queue_async_operation(request.clone())
            .await
            .expect("queue operation");
        request
    }

    pub async fn lease_one(&self) -> Message {
        self.lease_one_for(Duration::from_secs(60)).await
    }

    /// Lease the next message with a custom lock duration
    pub async fn lease_one_for(&self, visibility: Duration) -> Message {
        let mut leased = self.queue.lease(1, visibility).await.expect("lease");
        assert_eq!(leased.len(), 1, "expected one visible message");
        leased.remove(0)
    }

    pub async fn status_of(&self, request: &OperationRequest) -> OperationStatus {
        self.status
            .get(&request.resource_id, request.operation_id)
            .await
            .expect("operation status")
    }

    pub async fn resource_state(&self, resource_id: &str) -> String {
        let obj = self.db.get(resource_id).await.expect("resource");
        obj.data["provisioningState"]
            .as_str()
            .unwrap_or_default()
            .to_string()
    }
}

pub fn put_type() -> String {
    format!("{}|PUT", REDIS_TYPE)
}

pub fn delete_type() -> String {
    format!("{}|DELETE", REDIS_TYPE)
}
