use super::{EntitySchema, Operation, QueryOptions};
use crate::config::AdapterConfig;
use crate::core::{AdapterError, Result, Row};
use crate::filter::{Filter, FilterTranslator};
use crate::naming::NamingConverter;
use crate::relation::{IncludeSpec, RelationPlanner};
use crate::result::{OperationResult, ResultNormalizer};
use crate::transport::{CallContext, Transport, TransportRequest, TransportResponse};
use serde_json::Value;
use std::sync::Arc;
use tracing::{Instrument, Level, event, info_span};

/// Conversion components shared by every adapter of a registry.
#[derive(Debug, Clone, Default)]
pub struct AdapterContext {
    pub naming: NamingConverter,
    pub translator: FilterTranslator,
    pub planner: RelationPlanner,
    pub normalizer: ResultNormalizer,
}

impl AdapterContext {
    pub fn from_config(config: &AdapterConfig) -> Self {
        let naming = NamingConverter::new();
        Self {
            naming,
            translator: FilterTranslator::new(naming)
                .with_policy(config.or_group_policy)
                .with_null_sentinels(config.null_sentinels.clone()),
            planner: RelationPlanner::new(naming),
            normalizer: ResultNormalizer::new(config.error_code_table()),
        }
    }
}

/// CRUD facade over one table.
///
/// Every call runs `build -> execute -> normalize -> restore` with exactly
/// one transport round trip; anything rejected while building never reaches
/// the transport.
pub struct EntityAdapter {
    schema: EntitySchema,
    context: Arc<AdapterContext>,
    transport: Arc<dyn Transport>,
}

impl EntityAdapter {
    pub fn new(schema: EntitySchema, context: Arc<AdapterContext>, transport: Arc<dyn Transport>) -> Self {
        Self {
            schema,
            context,
            transport,
        }
    }

    pub fn name(&self) -> &str {
        &self.schema.name
    }

    pub fn schema(&self) -> &EntitySchema {
        &self.schema
    }

    pub async fn find_unique(&self, options: QueryOptions, context: CallContext) -> Result<Option<Row>> {
        self.single_row(Operation::FindUnique, &options, context).await
    }

    /// First match under `orderBy`; `Ok(None)` when nothing matches.
    pub async fn find_first(&self, options: QueryOptions, context: CallContext) -> Result<Option<Row>> {
        self.single_row(Operation::FindFirst, &options, context).await
    }

    pub async fn find_many(&self, options: QueryOptions, context: CallContext) -> Result<Vec<Row>> {
        let request = self.plan(Operation::FindMany, &options);
        self.many_rows(Operation::FindMany, request, &options, context).await
    }

    pub async fn create(&self, options: QueryOptions, context: CallContext) -> Result<Option<Row>> {
        self.single_row(Operation::Create, &options, context).await
    }

    pub async fn update(&self, options: QueryOptions, context: CallContext) -> Result<Option<Row>> {
        self.single_row(Operation::Update, &options, context).await
    }

    /// Deletes the one row matching `where` and returns it; `Ok(None)` when
    /// nothing matched. A filter matching several rows deletes nothing.
    pub async fn delete(&self, options: QueryOptions, context: CallContext) -> Result<Option<Row>> {
        self.single_row(Operation::Delete, &options, context).await
    }

    /// Deletes every row matching `where` and returns the removed rows,
    /// possibly none.
    pub async fn delete_many(&self, options: QueryOptions, context: CallContext) -> Result<Vec<Row>> {
        let request = self.plan_delete_many(&options);
        self.many_rows(Operation::Delete, request, &options, context).await
    }

    /// Runs `op` and folds the outcome into an [`OperationResult`].
    pub async fn run(&self, op: Operation, options: QueryOptions, context: CallContext) -> OperationResult {
        match op {
            Operation::FindUnique => self.find_unique(options, context).await.into(),
            Operation::FindFirst => self.find_first(options, context).await.into(),
            Operation::FindMany => self.find_many(options, context).await.into(),
            Operation::Create => self.create(options, context).await.into(),
            Operation::Update => self.update(options, context).await.into(),
            Operation::Delete => self.delete(options, context).await.into(),
        }
    }

    /// Like [`run`](Self::run), taking the raw JSON call argument in either
    /// the bare or the options form.
    pub async fn call(&self, op: Operation, argument: &Value, context: CallContext) -> OperationResult {
        match QueryOptions::parse(op, argument) {
            Ok(options) => self.run(op, options, context).await,
            Err(err) => OperationResult::Err(err),
        }
    }

    /// Builds the transport request `op` would issue, without sending it.
    pub fn plan(&self, op: Operation, options: &QueryOptions) -> Result<TransportRequest> {
        check_options(op, options)?;
        let request = TransportRequest::from(self.schema.table.clone());

        match op {
            Operation::FindUnique => {
                let filters = self.required_filters(op, options)?;
                Ok(request
                    .select(self.selection(options.include.as_ref())?)
                    .filters(filters)
                    .single())
            }
            Operation::FindFirst => Ok(self.read(request, options)?.limit(1)),
            Operation::FindMany => {
                let request = self.read(request, options)?;
                Ok(match options.take {
                    Some(n) => request.limit(n),
                    None => request,
                })
            }
            Operation::Create => {
                let row = self.payload(op, options)?;
                Ok(request
                    .insert(Value::Object(row))
                    .select(self.selection(options.include.as_ref())?)
                    .single())
            }
            Operation::Update => {
                let filters = self.required_filters(op, options)?;
                let row = self.payload(op, options)?;
                if row.is_empty() {
                    return Err(AdapterError::validation(format!(
                        "update on '{}' has no writable fields",
                        self.schema.name
                    )));
                }
                Ok(request
                    .update(row)
                    .filters(filters)
                    .select(self.selection(options.include.as_ref())?)
                    .single())
            }
            Operation::Delete => Ok(self.delete_request(options)?.single()),
        }
    }

    /// Builds the request [`delete_many`](Self::delete_many) would issue.
    pub fn plan_delete_many(&self, options: &QueryOptions) -> Result<TransportRequest> {
        check_options(Operation::Delete, options)?;
        self.delete_request(options)
    }

    fn delete_request(&self, options: &QueryOptions) -> Result<TransportRequest> {
        let filters = self.required_filters(Operation::Delete, options)?;
        Ok(TransportRequest::from(self.schema.table.clone())
            .delete()
            .filters(filters)
            .select("*"))
    }

    async fn single_row(&self, op: Operation, options: &QueryOptions, context: CallContext) -> Result<Option<Row>> {
        let span = info_span!("relquery.op", entity = %self.schema.name, op = %op);
        async move {
            let response = self.round_trip(self.plan(op, options), context).await?;
            let row = self.context.normalizer.single(response)?;
            event!(Level::DEBUG, found = row.is_some(), "normalize");
            Ok(row.map(|row| self.restore(row, options.include.as_ref())))
        }
        .instrument(span)
        .await
    }

    async fn many_rows(
        &self,
        op: Operation,
        request: Result<TransportRequest>,
        options: &QueryOptions,
        context: CallContext,
    ) -> Result<Vec<Row>> {
        let span = info_span!("relquery.op", entity = %self.schema.name, op = %op);
        async move {
            let response = self.round_trip(request, context).await?;
            let rows = self.context.normalizer.many(response)?;
            event!(Level::DEBUG, rows = rows.len(), "normalize");
            Ok(rows
                .into_iter()
                .map(|row| self.restore(row, options.include.as_ref()))
                .collect())
        }
        .instrument(span)
        .await
    }

    async fn round_trip(&self, request: Result<TransportRequest>, context: CallContext) -> Result<TransportResponse> {
        let request = match request {
            Ok(request) => request.with_context(context),
            Err(err) => {
                event!(Level::DEBUG, error = %err, "build rejected");
                return Err(err);
            }
        };
        event!(
            Level::DEBUG,
            table = %request.table,
            action = request.action.name(),
            filters = request.filters.len(),
            "build"
        );

        let response = self.transport.execute(request).await;
        event!(
            Level::DEBUG,
            transport = self.transport.name(),
            failed = response.error.is_some(),
            "execute"
        );
        Ok(response)
    }

    fn restore(&self, row: Row, include: Option<&IncludeSpec>) -> Row {
        let row = self.context.planner.restore(row, include, &self.schema.relations);
        let row = self
            .context
            .naming
            .row_to_application(row, &self.schema.opaque_columns());
        event!(Level::TRACE, "restore");
        row
    }

    fn read(&self, request: TransportRequest, options: &QueryOptions) -> Result<TransportRequest> {
        let mut request = request.select(self.selection(options.include.as_ref())?);
        if let Some(spec) = options.where_spec() {
            request = request.filters(self.context.translator.translate(spec, &self.schema.columns)?);
        }
        if let Some(order) = &options.order_by {
            let column = self.context.naming.storage_key(&order.field).into_owned();
            request = request.order(column, order.ascending);
        }
        Ok(request)
    }

    fn selection(&self, include: Option<&IncludeSpec>) -> Result<String> {
        self.context
            .planner
            .selection(&self.schema.name, include, &self.schema.relations)
    }

    /// Filters for operations that must never run unfiltered.
    fn required_filters(&self, op: Operation, options: &QueryOptions) -> Result<Vec<Filter>> {
        let spec = options.where_spec().ok_or_else(|| {
            AdapterError::validation(format!(
                "{op} on '{}' requires a non-empty where filter",
                self.schema.name
            ))
        })?;
        self.context.translator.translate(spec, &self.schema.columns)
    }

    /// Storage-cased payload without server-managed fields.
    fn payload(&self, op: Operation, options: &QueryOptions) -> Result<Row> {
        let data = options.data.clone().ok_or_else(|| {
            AdapterError::validation(format!("{op} on '{}' requires data", self.schema.name))
        })?;

        let row = self
            .context
            .naming
            .row_to_storage(data, &self.schema.opaque_columns());

        // A key the collision guard left verbatim is still matched by its
        // storage name.
        let naming = &self.context.naming;
        let (kept, stripped): (Row, Row) = row.into_iter().partition(|(key, _)| {
            !self
                .schema
                .server_managed
                .iter()
                .any(|field| naming.storage_key(key) == field.as_str())
        });
        if !stripped.is_empty() {
            event!(
                Level::DEBUG,
                fields = ?stripped.keys().collect::<Vec<_>>(),
                "stripped server-managed fields"
            );
        }
        Ok(kept)
    }
}

/// Rejects options that have no meaning for `op`.
fn check_options(op: Operation, options: &QueryOptions) -> Result<()> {
    let reject = |option: &str| {
        Err(AdapterError::validation(format!(
            "{op} does not accept '{option}'"
        )))
    };

    if options.data.is_some() && !matches!(op, Operation::Create | Operation::Update) {
        return reject("data");
    }
    if options.filter.is_some() && op == Operation::Create {
        return reject("where");
    }
    if options.include.is_some() && op == Operation::Delete {
        return reject("include");
    }
    if options.order_by.is_some() && !matches!(op, Operation::FindFirst | Operation::FindMany) {
        return reject("orderBy");
    }
    if options.take.is_some() && op != Operation::FindMany {
        return reject("take");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ColumnDef, ColumnType};
    use crate::entity::OrderSpec;
    use crate::filter::WhereSpec;
    use crate::relation::RelationDef;
    use crate::transport::{Action, MemoryTransport};
    use serde_json::json;

    fn adapter() -> EntityAdapter {
        let schema = EntitySchema::new("playlist", "playlists")
            .column("id", ColumnDef::new(ColumnType::Uuid))
            .column("user_id", ColumnDef::new(ColumnType::Uuid).nullable())
            .relation(RelationDef::to_one("user", "users"))
            .server_managed("user_id");
        EntityAdapter::new(
            schema,
            Arc::new(AdapterContext::default()),
            Arc::new(MemoryTransport::new()),
        )
    }

    #[test]
    fn test_plan_find_unique() {
        let options = QueryOptions::new()
            .filter(WhereSpec::new().eq("id", "7d1f2b4e-0000-4000-8000-000000000001"))
            .include(IncludeSpec::new().all("user"));
        let request = adapter().plan(Operation::FindUnique, &options).unwrap();

        assert_eq!(request.table, "playlists");
        assert_eq!(request.columns.as_deref(), Some("*, user:users(*)"));
        assert!(request.single);
        assert_eq!(
            request.filters,
            vec![Filter::Match(vec![(
                "id".to_string(),
                "7d1f2b4e-0000-4000-8000-000000000001".to_string()
            )])]
        );
    }

    #[test]
    fn test_plan_create_strips_server_managed() {
        let data = json!({"name": "X", "userId": "u1"}).as_object().cloned().unwrap();
        let request = adapter()
            .plan(Operation::Create, &QueryOptions::new().data(data))
            .unwrap();
        match request.action {
            Action::Insert(Value::Object(row)) => {
                assert_eq!(row.get("name"), Some(&json!("X")));
                assert!(!row.contains_key("user_id"));
            }
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn test_plan_strips_owner_kept_verbatim_by_collision_guard() {
        let data = json!({"name": "X", "userId": "u1", "user_id": "u2"}).as_object().cloned().unwrap();
        for op in [Operation::Create, Operation::Update] {
            let mut options = QueryOptions::new().data(data.clone());
            if op == Operation::Update {
                options = options.filter(WhereSpec::new().eq("name", "X"));
            }
            let request = adapter().plan(op, &options).unwrap();
            let row = match request.action {
                Action::Insert(Value::Object(row)) | Action::Update(row) => row,
                other => panic!("unexpected action {other:?}"),
            };
            assert_eq!(row.keys().collect::<Vec<_>>(), vec!["name"], "{op}");
        }
    }

    #[test]
    fn test_plan_delete_is_single_and_delete_many_is_not() {
        let options = QueryOptions::new().filter(WhereSpec::new().eq("name", "X"));
        let one = adapter().plan(Operation::Delete, &options).unwrap();
        assert_eq!(one.action, Action::Delete);
        assert!(one.single);

        let many = adapter().plan_delete_many(&options).unwrap();
        assert_eq!(many.action, Action::Delete);
        assert!(!many.single);
        assert_eq!(many.columns.as_deref(), Some("*"));
    }

    #[test]
    fn test_plan_rejects_unfiltered_writes() {
        let data = json!({"name": "Y"}).as_object().cloned().unwrap();
        let err = adapter()
            .plan(Operation::Update, &QueryOptions::new().data(data))
            .unwrap_err();
        assert!(err.message().contains("requires a non-empty where"));

        let err = adapter()
            .plan(Operation::Delete, &QueryOptions::new().filter(WhereSpec::new()))
            .unwrap_err();
        assert!(err.message().contains("requires a non-empty where"));

        let err = adapter()
            .plan_delete_many(&QueryOptions::new())
            .unwrap_err();
        assert!(err.message().contains("requires a non-empty where"));
    }

    #[test]
    fn test_plan_rejects_misplaced_options() {
        let err = adapter()
            .plan(Operation::FindUnique, &QueryOptions::new().take(3))
            .unwrap_err();
        assert_eq!(err.message(), "findUnique does not accept 'take'");
    }

    #[test]
    fn test_plan_find_first_limits_without_single() {
        let options = QueryOptions::new().order_by(OrderSpec::desc("createdAt"));
        let request = adapter().plan(Operation::FindFirst, &options).unwrap();
        assert_eq!(request.limit, Some(1));
        assert!(!request.single);
        assert_eq!(request.order.map(|o| o.column), Some("created_at".to_string()));
    }
}
