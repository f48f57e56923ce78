use std::collections::BTreeMap;

use poem::{
    http::{header, HeaderValue, StatusCode},
    web::cookie::Cookie,
    Endpoint, IntoResponse, Request,
};

use crate::{
    table::{SessionTable, StoredRecord},
    SameSitePolicy, SessionOptions,
};

pub(crate) const SECRET: &[u8] = b"0123456789abcdef0123456789abcdef";
pub(crate) const SECRET2: &[u8] = b"fedcba9876543210fedcba9876543210";

/// Exercises any table. Leaves no record behind.
pub(crate) async fn test_table(table: impl SessionTable) {
    let record1 = StoredRecord {
        id: "harness-a1".to_string(),
        values: "AAAA".to_string(),
        options: SessionOptions::default(),
    };
    let record2 = StoredRecord {
        id: "harness-a2".to_string(),
        values: "BBBB".to_string(),
        options: SessionOptions {
            path: "/app".to_string(),
            domain: Some("example.com".to_string()),
            max_age: 0,
            secure: false,
            http_only: false,
            same_site: Some(SameSitePolicy::Lax),
        },
    };

    assert_eq!(table.get_record("harness-a1").await.unwrap(), None);

    table.put_record(&record1).await.unwrap();
    table.put_record(&record2).await.unwrap();
    assert_eq!(
        table.get_record("harness-a1").await.unwrap().as_ref(),
        Some(&record1)
    );
    assert_eq!(
        table.get_record("harness-a2").await.unwrap().as_ref(),
        Some(&record2)
    );

    // full overwrite, no merge
    let record3 = StoredRecord {
        id: "harness-a2".to_string(),
        values: "CCCC".to_string(),
        options: SessionOptions::default(),
    };
    table.put_record(&record3).await.unwrap();
    assert_eq!(
        table.get_record("harness-a2").await.unwrap().as_ref(),
        Some(&record3)
    );

    table.delete_record("harness-a2").await.unwrap();
    assert_eq!(table.get_record("harness-a2").await.unwrap(), None);
    table.delete_record("harness-a2").await.unwrap();

    table.delete_record("harness-a1").await.unwrap();
    assert_eq!(table.get_record("harness-a1").await.unwrap(), None);
}

pub(crate) fn values(pairs: &[(&str, &str)]) -> BTreeMap<String, crate::Value> {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), (*value).into()))
        .collect()
}

/// A client that keeps the cookies set by previous responses.
#[derive(Default)]
pub(crate) struct TestClient {
    cookies: BTreeMap<String, String>,
}

impl TestClient {
    pub(crate) async fn call(&mut self, ep: &impl Endpoint, action: i32) -> StatusCode {
        self.call_uri(ep, &format!("/{action}")).await
    }

    pub(crate) async fn call_uri(&mut self, ep: &impl Endpoint, uri: &str) -> StatusCode {
        let mut req = Request::builder().uri(uri.parse().unwrap()).finish();

        let mut cookie = String::new();
        for (name, value) in &self.cookies {
            cookie += &format!("{name}={value};");
        }
        if !cookie.is_empty() {
            req.headers_mut()
                .insert(header::COOKIE, HeaderValue::from_str(&cookie).unwrap());
        }

        let resp = match ep.call(req).await {
            Ok(resp) => resp.into_response(),
            Err(err) => err.into_response(),
        };
        for s in resp.headers().get_all(header::SET_COOKIE) {
            if let Ok(s) = s.to_str() {
                let cookie = Cookie::parse(s).unwrap();

                if cookie.value_str().is_empty() {
                    self.cookies.remove(cookie.name());
                } else {
                    self.cookies
                        .insert(cookie.name().to_string(), cookie.value_str().to_string());
                }
            }
        }
        resp.status()
    }

    pub(crate) fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }
}
