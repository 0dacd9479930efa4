//! Flat preprint records (`record_id` plus top-level fields)

use serde::Deserialize;
use serde_json::Value;

use super::{Contributor, LinkStatus, PreprintDoc, Subject, lenient, lenient_strings};

#[derive(Debug, Deserialize)]
pub struct FlatRecord {
    pub record_id: String,
    #[serde(default, deserialize_with = "lenient")]
    pub provider: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub date_created: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub date_modified: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub date_published: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub date_registered: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub doi: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub license: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub version: Option<i64>,
    #[serde(default, deserialize_with = "lenient")]
    pub is_published: Option<bool>,
    /// Plain labels or `{id, text}` objects
    #[serde(default, deserialize_with = "lenient")]
    pub subjects: Vec<Value>,
    #[serde(default, deserialize_with = "lenient_strings")]
    pub tags: Vec<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub has_data_links: Option<LinkStatus>,
    #[serde(default, deserialize_with = "lenient")]
    pub data_links: Vec<Value>,
    #[serde(default, deserialize_with = "lenient")]
    pub contributors: Vec<FlatContributor>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FlatContributor {
    #[serde(deserialize_with = "lenient")]
    pub id: Option<String>,
    #[serde(alias = "full_name", deserialize_with = "lenient")]
    pub name: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub given_name: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub family_name: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub date_registered: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub orcid: Option<String>,
    pub employment: Option<Value>,
    #[serde(deserialize_with = "lenient")]
    pub index: Option<i64>,
    #[serde(deserialize_with = "lenient")]
    pub bibliographic: Option<bool>,
}

impl FlatRecord {
    pub fn into_doc(self) -> PreprintDoc {
        let id = self.record_id;
        let contributors = self
            .contributors
            .into_iter()
            .enumerate()
            .filter_map(|(pos, c)| {
                let Some(user_id) = c.id.filter(|s| !s.is_empty()) else {
                    log::warn!("{id}: skipping contributor #{pos} without an id");
                    return None;
                };
                Some(Contributor {
                    user_id,
                    index: c.index.unwrap_or(pos as i64),
                    bibliographic: c.bibliographic.unwrap_or(true),
                    full_name: c.name,
                    given_name: c.given_name,
                    family_name: c.family_name,
                    date_registered: c.date_registered,
                    orcid: c.orcid,
                    employment: c.employment,
                    education: None,
                    profile_url: None,
                })
            })
            .collect();
        let subjects = self.subjects.iter().filter_map(subject).collect();

        PreprintDoc {
            provider: self.provider,
            title: self.title,
            description: self.description,
            date_created: self.date_created,
            date_modified: self.date_modified,
            date_published: self.date_published,
            date_registered: self.date_registered,
            doi: self.doi,
            license: self.license,
            version: self.version,
            is_published: self.is_published,
            has_data_links: self.has_data_links,
            data_links: self.data_links,
            tags: self.tags,
            subjects,
            contributors,
            id,
            ..Default::default()
        }
    }
}

/// A bare label is its own id.
fn subject(v: &Value) -> Option<Subject> {
    match v {
        Value::String(label) if !label.trim().is_empty() => Some(Subject {
            id: label.clone(),
            text: Some(label.clone()),
        }),
        Value::Object(obj) => {
            let text = obj.get("text").and_then(Value::as_str).map(str::to_string);
            let id = obj
                .get("id")
                .and_then(Value::as_str)
                .map(str::to_string)
                .or_else(|| text.clone())?;
            Some(Subject { id, text })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::super::extract;
    use serde_json::json;

    #[test]
    fn minimal_flat_record() {
        let doc = extract(&json!({
            "record_id": "abc12",
            "title": "T",
            "contributors": [{"id": "u1", "name": "A"}]
        }))
        .unwrap();
        assert_eq!(doc.id, "abc12");
        assert_eq!(doc.title.as_deref(), Some("T"));
        assert_eq!(doc.contributors.len(), 1);
        assert_eq!(doc.contributors[0].user_id, "u1");
        assert_eq!(doc.contributors[0].full_name.as_deref(), Some("A"));
        assert!(doc.contributors[0].bibliographic);

        let rows = doc.into_rows();
        assert_eq!(rows.preprint.base_id, "abc12");
        assert_eq!(rows.preprint.version, None);
        assert_eq!(rows.preprint.contributors_list.as_deref(), Some("A"));
    }

    #[test]
    fn contributor_without_id_skipped() {
        let doc = extract(&json!({
            "record_id": "abc12",
            "contributors": [{"name": "Nobody"}, {"id": "u2", "full_name": "B"}]
        }))
        .unwrap();
        assert_eq!(doc.contributors.len(), 1);
        assert_eq!(doc.contributors[0].index, 1);
        assert_eq!(doc.contributors[0].full_name.as_deref(), Some("B"));
    }

    #[test]
    fn subject_forms() {
        let doc = extract(&json!({
            "record_id": "abc12",
            "subjects": ["Psychology", {"id": "s9", "text": "Neuroscience"}, 7, ""]
        }))
        .unwrap();
        let ids: Vec<_> = doc.subjects.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["Psychology", "s9"]);
    }

    #[test]
    fn null_lists_are_empty() {
        let doc = extract(&json!({"record_id": "abc12", "tags": null, "contributors": null})).unwrap();
        assert!(doc.tags.is_empty());
        assert!(doc.contributors.is_empty());
    }
}
