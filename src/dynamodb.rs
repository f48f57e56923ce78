use std::collections::HashMap;

use aws_sdk_dynamodb::{types::AttributeValue, Client};

use crate::{
    table::{SessionTable, StoredRecord},
    Error, Result, SameSitePolicy, SessionOptions, TableConfig,
};

const ATTR_ID: &str = "id";
const ATTR_VALUES: &str = "values";
const ATTR_OPTIONS: &str = "options";

/// Session table using DynamoDB.
///
/// # Errors
///
/// - [`aws_sdk_dynamodb::Error`]
///
/// # Create the table for session storage
///
/// ```shell
/// aws dynamodb create-table \
///     --table-name poem_sessions \
///     --attribute-definitions AttributeName=id,AttributeType=S \
///     --key-schema AttributeName=id,KeyType=HASH \
///     --billing-mode PAY_PER_REQUEST
/// ```
///
/// Each item has exactly three attributes: `id` (string), `values` (string)
/// and `options` (map with `Path`, `Domain`, `MaxAge`, `Secure`, `HttpOnly`
/// and `SameSite`).
#[cfg_attr(docsrs, doc(cfg(feature = "dynamodb")))]
#[derive(Clone)]
pub struct DynamoTable {
    client: Client,
    table_name: String,
}

impl DynamoTable {
    /// Create a [`DynamoTable`] with an existing client.
    pub fn new(config: TableConfig, client: Client) -> Self {
        Self {
            client,
            table_name: config.table_name,
        }
    }

    /// Create a [`DynamoTable`] with the client configuration loaded from
    /// the environment.
    pub async fn from_env(config: TableConfig) -> Self {
        let sdk_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self::new(config, Client::new(&sdk_config))
    }

    /// Returns the name of the table.
    pub fn table_name(&self) -> &str {
        &self.table_name
    }
}

#[async_trait::async_trait]
impl SessionTable for DynamoTable {
    async fn get_record(&self, id: &str) -> Result<Option<StoredRecord>> {
        let output = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key(ATTR_ID, AttributeValue::S(id.to_string()))
            .consistent_read(true)
            .send()
            .await
            .map_err(Error::store_read)?;

        match output.item {
            Some(item) if !item.is_empty() => record_from_item(&item).map(Some),
            _ => Ok(None),
        }
    }

    async fn put_record(&self, record: &StoredRecord) -> Result<()> {
        self.client
            .put_item()
            .table_name(&self.table_name)
            .item(ATTR_ID, AttributeValue::S(record.id.clone()))
            .item(ATTR_VALUES, AttributeValue::S(record.values.clone()))
            .item(ATTR_OPTIONS, options_to_attribute(&record.options))
            .send()
            .await
            .map_err(Error::store_write)?;
        Ok(())
    }

    async fn delete_record(&self, id: &str) -> Result<()> {
        self.client
            .delete_item()
            .table_name(&self.table_name)
            .key(ATTR_ID, AttributeValue::S(id.to_string()))
            .send()
            .await
            .map_err(Error::store_delete)?;
        Ok(())
    }
}

fn record_from_item(item: &HashMap<String, AttributeValue>) -> Result<StoredRecord> {
    let malformed = |attr: &str| Error::Deserialize(format!("malformed `{attr}` attribute"));

    let id = item
        .get(ATTR_ID)
        .and_then(|value| value.as_s().ok())
        .ok_or_else(|| malformed(ATTR_ID))?;
    let values = item
        .get(ATTR_VALUES)
        .and_then(|value| value.as_s().ok())
        .ok_or_else(|| malformed(ATTR_VALUES))?;
    let options = match item.get(ATTR_OPTIONS) {
        Some(AttributeValue::M(map)) => options_from_map(map)?,
        Some(AttributeValue::Null(_)) | None => SessionOptions::default(),
        Some(_) => return Err(malformed(ATTR_OPTIONS)),
    };

    Ok(StoredRecord {
        id: id.clone(),
        values: values.clone(),
        options,
    })
}

// Same numbering as the `SameSite` enumeration of Go's net/http, which wrote
// the first tables of this shape.
fn same_site_code(same_site: Option<SameSitePolicy>) -> i64 {
    match same_site {
        None => 0,
        Some(SameSitePolicy::Lax) => 2,
        Some(SameSitePolicy::Strict) => 3,
        Some(SameSitePolicy::None) => 4,
    }
}

fn same_site_from_code(code: i64) -> Option<SameSitePolicy> {
    match code {
        2 => Some(SameSitePolicy::Lax),
        3 => Some(SameSitePolicy::Strict),
        4 => Some(SameSitePolicy::None),
        _ => None,
    }
}

fn options_to_attribute(options: &SessionOptions) -> AttributeValue {
    let mut map = HashMap::new();
    map.insert("Path".to_string(), AttributeValue::S(options.path.clone()));
    if let Some(domain) = &options.domain {
        map.insert("Domain".to_string(), AttributeValue::S(domain.clone()));
    }
    map.insert(
        "MaxAge".to_string(),
        AttributeValue::N(options.max_age.to_string()),
    );
    map.insert("Secure".to_string(), AttributeValue::Bool(options.secure));
    map.insert(
        "HttpOnly".to_string(),
        AttributeValue::Bool(options.http_only),
    );
    map.insert(
        "SameSite".to_string(),
        AttributeValue::N(same_site_code(options.same_site).to_string()),
    );
    AttributeValue::M(map)
}

fn options_from_map(map: &HashMap<String, AttributeValue>) -> Result<SessionOptions> {
    let string = |name: &str| map.get(name).and_then(|value| value.as_s().ok()).cloned();
    let boolean = |name: &str| {
        map.get(name)
            .and_then(|value| value.as_bool().ok())
            .copied()
            .unwrap_or(false)
    };
    let number = |name: &str| -> Result<i64> {
        match map.get(name).and_then(|value| value.as_n().ok()) {
            Some(n) => n
                .parse()
                .map_err(|_| Error::Deserialize(format!("malformed `{name}` option"))),
            None => Ok(0),
        }
    };

    Ok(SessionOptions {
        path: string("Path").unwrap_or_default(),
        domain: string("Domain").filter(|domain| !domain.is_empty()),
        max_age: number("MaxAge")?,
        secure: boolean("Secure"),
        http_only: boolean("HttpOnly"),
        same_site: same_site_from_code(number("SameSite")?),
    })
}

#[cfg(test)]
mod tests {
    use aws_sdk_dynamodb::{
        config::{retry::RetryConfig, BehaviorVersion, Credentials, Region},
        types::{
            AttributeDefinition, BillingMode, KeySchemaElement, KeyType, ScalarAttributeType,
        },
        Config,
    };

    use super::*;
    use crate::test_harness;

    const TABLE_NAME: &str = "test_poem_sessions";

    #[test]
    fn options_attribute_round_trip() {
        let options = SessionOptions {
            path: "/app".to_string(),
            domain: Some("example.com".to_string()),
            max_age: -1,
            secure: false,
            http_only: true,
            same_site: Some(SameSitePolicy::Strict),
        };
        let AttributeValue::M(map) = options_to_attribute(&options) else {
            panic!("options must be a map attribute");
        };
        assert_eq!(options_from_map(&map).unwrap(), options);
    }

    #[test]
    fn record_with_go_zero_values() {
        let mut options = HashMap::new();
        options.insert("Path".to_string(), AttributeValue::S(String::new()));
        options.insert("Domain".to_string(), AttributeValue::S(String::new()));
        options.insert("MaxAge".to_string(), AttributeValue::N("0".to_string()));
        options.insert("SameSite".to_string(), AttributeValue::N("1".to_string()));

        let mut item = HashMap::new();
        item.insert(ATTR_ID.to_string(), AttributeValue::S("abc".to_string()));
        item.insert(ATTR_VALUES.to_string(), AttributeValue::S("AAAA".to_string()));
        item.insert(ATTR_OPTIONS.to_string(), AttributeValue::M(options));

        let record = record_from_item(&item).unwrap();
        assert_eq!(record.id, "abc");
        assert_eq!(record.options.domain, None);
        assert_eq!(record.options.same_site, None);
        assert!(!record.options.secure);

        item.remove(ATTR_VALUES);
        assert!(matches!(
            record_from_item(&item),
            Err(Error::Deserialize(_))
        ));
    }

    #[tokio::test]
    async fn dynamo_table() {
        let config = Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url("http://localhost:8000")
            .region(Region::new("us-east-1"))
            .credentials_provider(Credentials::new("dummy", "dummy", None, None, "test"))
            .retry_config(RetryConfig::disabled())
            .build();
        let client = Client::from_conf(config);

        let _ = client.delete_table().table_name(TABLE_NAME).send().await;
        let created = client
            .create_table()
            .table_name(TABLE_NAME)
            .key_schema(
                KeySchemaElement::builder()
                    .attribute_name(ATTR_ID)
                    .key_type(KeyType::Hash)
                    .build()
                    .unwrap(),
            )
            .attribute_definitions(
                AttributeDefinition::builder()
                    .attribute_name(ATTR_ID)
                    .attribute_type(ScalarAttributeType::S)
                    .build()
                    .unwrap(),
            )
            .billing_mode(BillingMode::PayPerRequest)
            .send()
            .await;
        if created.is_err() {
            // no DynamoDB Local listening
            return;
        }

        let table = DynamoTable::new(TableConfig::new().table_name(TABLE_NAME), client.clone());
        test_harness::test_table(table).await;

        client
            .delete_table()
            .table_name(TABLE_NAME)
            .send()
            .await
            .unwrap();
    }
}
