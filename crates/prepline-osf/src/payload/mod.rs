//! Preprint payload model and extraction into relational rows
//!
//! A raw document is either a JSON:API resource as served by OSF or a flat
//! record. Both normalize into [`PreprintDoc`], whose only required field
//! is `id`. Everything else is optional and lands as NULL or empty.

mod flat;
mod jsonapi;

use std::collections::{BTreeSet, HashSet};

use prepline_store::{Authorship, ContributorRow, NormalizedPreprint, PreprintRow, SubjectRow};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

pub use flat::{FlatContributor, FlatRecord};
pub use jsonapi::JsonApiResource;

use crate::error::ParseError;

const DOI_PREFIX: &str = "https://doi.org/";
const DOWNLOAD_PREFIX: &str = "https://osf.io/download/";

/// Accepted document shapes, decided by which fields are present.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    JsonApi(Box<JsonApiResource>),
    Flat(Box<FlatRecord>),
}

impl Payload {
    pub fn into_doc(self) -> PreprintDoc {
        match self {
            Self::JsonApi(r) => r.into_doc(),
            Self::Flat(r) => r.into_doc(),
        }
    }
}

/// `has_data_links` / `has_prereg_links`: a flag or a status word.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum LinkStatus {
    Flag(bool),
    Status(String),
}

impl LinkStatus {
    fn is_available(&self) -> bool {
        match self {
            Self::Flag(b) => *b,
            Self::Status(s) => matches!(s.as_str(), "available" | "true"),
        }
    }

    fn label(&self) -> String {
        match self {
            Self::Flag(b) => b.to_string(),
            Self::Status(s) => s.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    pub id: String,
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Contributor {
    pub user_id: String,
    /// Author position; falls back to list position
    pub index: i64,
    pub bibliographic: bool,
    pub full_name: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub date_registered: Option<String>,
    pub orcid: Option<String>,
    pub employment: Option<Value>,
    pub education: Option<Value>,
    pub profile_url: Option<String>,
}

/// One preprint, whichever shape it arrived in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreprintDoc {
    pub id: String,
    pub provider: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub date_created: Option<String>,
    pub date_modified: Option<String>,
    pub date_published: Option<String>,
    pub original_publication_date: Option<String>,
    pub date_registered: Option<String>,
    pub doi: Option<String>,
    pub preprint_doi: Option<String>,
    pub license: Option<String>,
    pub primary_file: Option<String>,
    pub is_published: Option<bool>,
    pub reviews_state: Option<String>,
    pub version: Option<i64>,
    pub has_coi: Option<bool>,
    pub conflict_of_interest_statement: Option<String>,
    pub has_data_links: Option<LinkStatus>,
    pub data_links: Vec<Value>,
    pub why_no_data: Option<String>,
    pub has_prereg_links: Option<LinkStatus>,
    pub prereg_links: Vec<Value>,
    pub why_no_prereg: Option<String>,
    pub prereg_link_info: Option<String>,
    /// Raw tag strings, before splitting
    pub tags: Vec<String>,
    /// In document order, possibly with repeats
    pub subjects: Vec<Subject>,
    pub contributors: Vec<Contributor>,
}

/// Parse the bytes of a stored raw document into its payload.
///
/// Raw Store files wrap the payload in an envelope; bare payloads are
/// accepted as well.
pub fn parse_raw_document(bytes: &[u8]) -> Result<Value, ParseError> {
    let mut doc: Value =
        serde_json::from_slice(bytes).map_err(|e| ParseError::NotJson(e.to_string()))?;
    let is_envelope = doc.get("payload").is_some_and(Value::is_object)
        && doc.get("fetched_at").is_some();
    if is_envelope {
        return Ok(doc["payload"].take());
    }
    Ok(doc)
}

/// Interpret one payload as a preprint.
pub fn extract(doc: &Value) -> Result<PreprintDoc, ParseError> {
    let Some(obj) = doc.as_object() else {
        return Err(ParseError::UnknownShape(format!(
            "expected an object, found {}",
            json_kind(doc)
        )));
    };
    let has_id = ["id", "record_id"].iter().any(|key| {
        obj.get(*key)
            .and_then(Value::as_str)
            .is_some_and(|s| !s.trim().is_empty())
    });
    if !has_id {
        return Err(ParseError::MissingId);
    }
    let payload = Payload::deserialize(doc).map_err(|e| ParseError::UnknownShape(e.to_string()))?;
    Ok(payload.into_doc())
}

impl PreprintDoc {
    /// Flatten into relational rows.
    ///
    /// Pure function of the document: identical input always yields
    /// identical rows.
    pub fn into_rows(self) -> NormalizedPreprint {
        let (base_id, id_version) = split_version(&self.id);
        let version = self.version.or(id_version);

        let mut contributors = self.contributors;
        contributors.sort_by_key(|c| c.index);
        let mut seen = HashSet::new();
        contributors.retain(|c| seen.insert(c.user_id.clone()));

        let names: Vec<&str> = contributors
            .iter()
            .filter(|c| c.bibliographic)
            .filter_map(|c| c.full_name.as_deref())
            .filter(|n| !n.trim().is_empty())
            .collect();
        let contributors_list = (!names.is_empty()).then(|| names.join("; "));
        let first_author = names.first().map(|n| n.to_string());

        let mut seen = HashSet::new();
        let subjects: Vec<SubjectRow> = self
            .subjects
            .into_iter()
            .filter(|s| seen.insert(s.id.clone()))
            .map(|s| SubjectRow {
                id: s.id,
                text: s.text,
            })
            .collect();
        let labels: Vec<&str> = subjects
            .iter()
            .map(|s| s.text.as_deref().unwrap_or(s.id.as_str()))
            .collect();

        let has_data_links = self.has_data_links.as_ref().is_some_and(LinkStatus::is_available)
            || !self.data_links.is_empty();
        let has_prereg_links = self
            .has_prereg_links
            .as_ref()
            .is_some_and(LinkStatus::is_available)
            || !self.prereg_links.is_empty();

        let preprint = PreprintRow {
            id: self.id.clone(),
            base_id: base_id.to_string(),
            version,
            is_latest_version: true,
            provider: self.provider,
            title: self.title,
            description: self.description,
            date_created: self.date_created,
            date_modified: self.date_modified,
            date_published: self.date_published,
            original_publication_date: self.original_publication_date,
            date_registered: self.date_registered,
            publication_doi: non_empty(&self.doi).map(|d| format!("{DOI_PREFIX}{d}")),
            doi: self.doi,
            preprint_doi: self.preprint_doi,
            license: self.license,
            download_url: non_empty(&self.primary_file).map(|f| format!("{DOWNLOAD_PREFIX}{f}")),
            is_published: self.is_published,
            reviews_state: self.reviews_state,
            has_coi: self.has_coi,
            conflict_of_interest_statement: self.conflict_of_interest_statement,
            has_data_links,
            data_links_status: self.has_data_links.as_ref().map(LinkStatus::label),
            data_links: Value::Array(self.data_links).to_string(),
            why_no_data: self.why_no_data,
            has_prereg_links,
            prereg_links_status: self.has_prereg_links.as_ref().map(LinkStatus::label),
            prereg_links: Value::Array(self.prereg_links).to_string(),
            why_no_prereg: self.why_no_prereg,
            prereg_link_info: self.prereg_link_info,
            tags: string_array(split_tags(&self.tags)),
            subjects: string_array(labels),
            contributors_list,
            first_author,
        };

        let authorships = contributors
            .iter()
            .map(|c| Authorship {
                osf_user_id: c.user_id.clone(),
                author_index: c.index,
                bibliographic: c.bibliographic,
            })
            .collect();
        let contributors = contributors
            .into_iter()
            .map(|c| ContributorRow {
                osf_user_id: c.user_id,
                full_name: c.full_name,
                given_name: c.given_name,
                family_name: c.family_name,
                date_registered: c.date_registered,
                orcid: c.orcid,
                employment: c.employment.as_ref().and_then(opaque_json),
                education: c.education.as_ref().and_then(opaque_json),
                profile_url: c.profile_url,
            })
            .collect();

        NormalizedPreprint {
            preprint,
            contributors,
            authorships,
            subjects,
        }
    }
}

/// Split `abc12_v3` into `("abc12", Some(3))`; other ids have no version.
pub fn split_version(id: &str) -> (&str, Option<i64>) {
    if let Some((base, n)) = id.rsplit_once("_v") {
        if !base.is_empty() && !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(v) = n.parse() {
                return (base, Some(v));
            }
        }
    }
    (id, None)
}

/// Tags split on `,` and `;`, trimmed, deduplicated and sorted.
pub fn split_tags<S: AsRef<str>>(raw: &[S]) -> Vec<&str> {
    let set: BTreeSet<&str> = raw
        .iter()
        .flat_map(|t| t.as_ref().split([',', ';']))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect();
    set.into_iter().collect()
}

fn string_array<S: AsRef<str>>(items: impl IntoIterator<Item = S>) -> String {
    Value::Array(
        items
            .into_iter()
            .map(|s| Value::String(s.as_ref().to_string()))
            .collect(),
    )
    .to_string()
}

fn non_empty(s: &Option<String>) -> Option<&str> {
    s.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Keep structured fields verbatim; empty containers count as absent.
fn opaque_json(v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::Array(a) if a.is_empty() => None,
        Value::Object(o) if o.is_empty() => None,
        other => Some(other.to_string()),
    }
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Missing, `null` and mistyped values all read as the empty default.
///
/// A type mismatch is logged and otherwise ignored, so one bad optional
/// field never costs the whole record.
pub(crate) fn lenient<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + DeserializeOwned,
{
    let value = Value::deserialize(d)?;
    if value.is_null() {
        return Ok(T::default());
    }
    match T::deserialize(&value) {
        Ok(v) => Ok(v),
        Err(e) => {
            log::warn!("ignoring mistyped field ({}): {e}", json_kind(&value));
            Ok(T::default())
        }
    }
}

/// String lists that may hold stray non-strings; those are dropped.
pub(crate) fn lenient_strings<'de, D>(d: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let values: Vec<Value> = lenient(d)?;
    Ok(values
        .into_iter()
        .filter_map(|v| match v {
            Value::String(s) => Some(s),
            _ => None,
        })
        .collect())
}
