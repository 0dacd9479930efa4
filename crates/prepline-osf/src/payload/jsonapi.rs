//! JSON:API preprint resource as served by `/v2/preprints/`
//!
//! Only `id` is required. Every other field goes through [`lenient`], so a
//! missing, null or mistyped value is read as absent instead of rejecting
//! the resource.

use serde::Deserialize;
use serde_json::Value;

use super::{Contributor, LinkStatus, PreprintDoc, Subject, lenient, lenient_strings};

#[derive(Debug, Deserialize)]
pub struct JsonApiResource {
    pub id: String,
    #[serde(default, deserialize_with = "lenient")]
    pub attributes: Attributes,
    #[serde(default, deserialize_with = "lenient")]
    pub relationships: Relationships,
    #[serde(default, deserialize_with = "lenient")]
    pub links: ResourceLinks,
    #[serde(default, deserialize_with = "lenient")]
    pub embeds: Embeds,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Attributes {
    #[serde(deserialize_with = "lenient")]
    pub title: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub description: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub date_created: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub date_modified: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub date_published: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub original_publication_date: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub date_registered: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub doi: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub is_published: Option<bool>,
    #[serde(deserialize_with = "lenient")]
    pub reviews_state: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub version: Option<i64>,
    #[serde(deserialize_with = "lenient")]
    pub has_coi: Option<bool>,
    #[serde(deserialize_with = "lenient")]
    pub conflict_of_interest_statement: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub has_data_links: Option<LinkStatus>,
    #[serde(deserialize_with = "lenient")]
    pub data_links: Vec<Value>,
    #[serde(deserialize_with = "lenient")]
    pub why_no_data: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub has_prereg_links: Option<LinkStatus>,
    #[serde(deserialize_with = "lenient")]
    pub prereg_links: Vec<Value>,
    #[serde(deserialize_with = "lenient")]
    pub why_no_prereg: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub prereg_link_info: Option<String>,
    #[serde(deserialize_with = "lenient_strings")]
    pub tags: Vec<String>,
    /// One list per subject hierarchy, root first
    #[serde(deserialize_with = "lenient")]
    pub subjects: Vec<Vec<SubjectRef>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SubjectRef {
    #[serde(deserialize_with = "lenient")]
    pub id: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub text: Option<String>,
}

/// `{"data": {"id": ...}}` relationship linkage
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Linkage {
    #[serde(deserialize_with = "lenient")]
    pub data: Option<LinkageId>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LinkageId {
    #[serde(deserialize_with = "lenient")]
    pub id: Option<String>,
}

impl Linkage {
    fn id(&self) -> Option<&str> {
        self.data.as_ref()?.id.as_deref().filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Relationships {
    #[serde(deserialize_with = "lenient")]
    pub provider: Option<Linkage>,
    #[serde(deserialize_with = "lenient")]
    pub primary_file: Option<Linkage>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ResourceLinks {
    #[serde(deserialize_with = "lenient")]
    pub preprint_doi: Option<String>,
}

/// An embedded resource; failed embeds carry `errors` and no `data`.
#[derive(Debug, Deserialize)]
pub struct Embedded<T> {
    #[serde(default = "Option::default")]
    pub data: Option<T>,
}

impl<T> Default for Embedded<T> {
    fn default() -> Self {
        Self { data: None }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Embeds {
    #[serde(deserialize_with = "lenient")]
    pub license: Option<Embedded<LicenseDoc>>,
    #[serde(deserialize_with = "lenient")]
    pub contributors: Option<Embedded<Vec<ContributorDoc>>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LicenseDoc {
    #[serde(deserialize_with = "lenient")]
    pub attributes: LicenseAttributes,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LicenseAttributes {
    #[serde(deserialize_with = "lenient")]
    pub name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ContributorDoc {
    #[serde(deserialize_with = "lenient")]
    pub attributes: ContributorAttributes,
    #[serde(deserialize_with = "lenient")]
    pub relationships: ContributorRelationships,
    #[serde(deserialize_with = "lenient")]
    pub embeds: ContributorEmbeds,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ContributorAttributes {
    #[serde(deserialize_with = "lenient")]
    pub index: Option<i64>,
    #[serde(deserialize_with = "lenient")]
    pub bibliographic: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ContributorRelationships {
    #[serde(deserialize_with = "lenient")]
    pub users: Option<Linkage>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ContributorEmbeds {
    #[serde(deserialize_with = "lenient")]
    pub users: Option<Embedded<UserDoc>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UserDoc {
    #[serde(deserialize_with = "lenient")]
    pub id: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub attributes: UserAttributes,
    #[serde(deserialize_with = "lenient")]
    pub links: UserLinks,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UserAttributes {
    #[serde(deserialize_with = "lenient")]
    pub full_name: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub given_name: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub family_name: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub date_registered: Option<String>,
    pub employment: Option<Value>,
    pub education: Option<Value>,
    #[serde(deserialize_with = "lenient")]
    pub social: Option<Social>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Social {
    #[serde(deserialize_with = "lenient")]
    pub orcid: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UserLinks {
    #[serde(deserialize_with = "lenient")]
    pub html: Option<String>,
}

impl JsonApiResource {
    pub fn into_doc(self) -> PreprintDoc {
        let a = self.attributes;
        let license = self
            .embeds
            .license
            .and_then(|e| e.data)
            .and_then(|l| l.attributes.name);
        let contributor_docs = self
            .embeds
            .contributors
            .and_then(|e| e.data)
            .unwrap_or_default();
        let contributors = contributor_docs
            .into_iter()
            .enumerate()
            .filter_map(|(pos, c)| contributor(&self.id, pos, c))
            .collect();
        let subjects = a
            .subjects
            .into_iter()
            .flatten()
            .filter_map(|s| {
                let id = s.id.filter(|id| !id.is_empty())?;
                Some(Subject { id, text: s.text })
            })
            .collect();

        PreprintDoc {
            provider: self
                .relationships
                .provider
                .as_ref()
                .and_then(Linkage::id)
                .map(str::to_string),
            primary_file: self
                .relationships
                .primary_file
                .as_ref()
                .and_then(Linkage::id)
                .map(str::to_string),
            preprint_doi: self.links.preprint_doi,
            license,
            title: a.title,
            description: a.description,
            date_created: a.date_created,
            date_modified: a.date_modified,
            date_published: a.date_published,
            original_publication_date: a.original_publication_date,
            date_registered: a.date_registered,
            doi: a.doi,
            is_published: a.is_published,
            reviews_state: a.reviews_state,
            version: a.version,
            has_coi: a.has_coi,
            conflict_of_interest_statement: a.conflict_of_interest_statement,
            has_data_links: a.has_data_links,
            data_links: a.data_links,
            why_no_data: a.why_no_data,
            has_prereg_links: a.has_prereg_links,
            prereg_links: a.prereg_links,
            why_no_prereg: a.why_no_prereg,
            prereg_link_info: a.prereg_link_info,
            tags: a.tags,
            subjects,
            contributors,
            id: self.id,
        }
    }
}

fn contributor(preprint_id: &str, pos: usize, c: ContributorDoc) -> Option<Contributor> {
    let user = c.embeds.users.and_then(|e| e.data).unwrap_or_default();
    let user_id = c
        .relationships
        .users
        .as_ref()
        .and_then(Linkage::id)
        .map(str::to_string)
        .or_else(|| user.id.clone().filter(|id| !id.is_empty()));
    let Some(user_id) = user_id else {
        log::warn!("{preprint_id}: skipping contributor #{pos} without a user id");
        return None;
    };
    let attrs = user.attributes;
    Some(Contributor {
        user_id,
        index: c.attributes.index.unwrap_or(pos as i64),
        bibliographic: c.attributes.bibliographic.unwrap_or(true),
        full_name: attrs.full_name,
        given_name: attrs.given_name,
        family_name: attrs.family_name,
        date_registered: attrs.date_registered,
        orcid: attrs
            .social
            .and_then(|s| s.orcid)
            .filter(|o| !o.is_empty()),
        employment: attrs.employment,
        education: attrs.education,
        profile_url: user.links.html,
    })
}

#[cfg(test)]
mod tests {
    use super::super::extract;
    use serde_json::json;

    fn sample() -> serde_json::Value {
        json!({
            "id": "abc12_v2",
            "type": "preprints",
            "attributes": {
                "title": "Replication of X",
                "description": "We replicate X.",
                "date_created": "2024-02-28T10:00:00.000000",
                "date_modified": "2024-03-01T12:30:00.000000",
                "doi": "10.1234/xyz",
                "is_published": true,
                "version": null,
                "tags": ["replication; open science", "Replication"],
                "subjects": [
                    [{"id": "s1", "text": "Social and Behavioral Sciences"}, {"id": "s2", "text": "Psychology"}],
                    [{"id": "s1", "text": "Social and Behavioral Sciences"}, {"id": "s3", "text": "Cognitive Psychology"}]
                ],
                "has_data_links": "available",
                "data_links": null,
                "has_prereg_links": "not_applicable"
            },
            "relationships": {
                "provider": {"data": {"id": "psyarxiv", "type": "preprint-providers"}},
                "primary_file": {"data": {"id": "f00d1", "type": "files"}}
            },
            "links": {"preprint_doi": "https://doi.org/10.31234/osf.io/abc12"},
            "embeds": {
                "license": {"data": {"attributes": {"name": "CC-By Attribution 4.0 International"}}},
                "contributors": {"data": [
                    {
                        "attributes": {"index": 1, "bibliographic": true},
                        "relationships": {"users": {"data": {"id": "u2"}}},
                        "embeds": {"users": {"data": {
                            "id": "u2",
                            "attributes": {"full_name": "Bea Second", "social": {"orcid": "0000-0002-0000-0002"}},
                            "links": {"html": "https://osf.io/u2/"}
                        }}}
                    },
                    {
                        "attributes": {"index": 0},
                        "embeds": {"users": {"data": {
                            "id": "u1",
                            "attributes": {
                                "full_name": "Ann First",
                                "date_registered": "2019-01-01T00:00:00.000000",
                                "employment": [{"institution": "Uni"}]
                            }
                        }}}
                    },
                    {"attributes": {"index": 2}, "embeds": {"users": {"errors": [{"detail": "gone"}]}}}
                ]}
            }
        })
    }

    #[test]
    fn extracts_jsonapi_fields() {
        let doc = extract(&sample()).unwrap();
        assert_eq!(doc.id, "abc12_v2");
        assert_eq!(doc.provider.as_deref(), Some("psyarxiv"));
        assert_eq!(doc.license.as_deref(), Some("CC-By Attribution 4.0 International"));
        assert_eq!(doc.primary_file.as_deref(), Some("f00d1"));
        assert_eq!(doc.contributors.len(), 2);
        assert_eq!(doc.contributors[0].orcid.as_deref(), Some("0000-0002-0000-0002"));
        assert_eq!(doc.contributors[1].user_id, "u1");
        assert_eq!(doc.subjects.len(), 4);
    }

    #[test]
    fn normalizes_jsonapi_rows() {
        let rows = extract(&sample()).unwrap().into_rows();
        let p = &rows.preprint;
        assert_eq!(p.base_id, "abc12");
        assert_eq!(p.version, Some(2));
        assert_eq!(p.publication_doi.as_deref(), Some("https://doi.org/10.1234/xyz"));
        assert_eq!(p.download_url.as_deref(), Some("https://osf.io/download/f00d1"));
        assert_eq!(p.contributors_list.as_deref(), Some("Ann First; Bea Second"));
        assert_eq!(p.first_author.as_deref(), Some("Ann First"));
        assert_eq!(p.tags, r#"["Replication","open science","replication"]"#);
        assert!(p.has_data_links);
        assert_eq!(p.data_links, "[]");
        assert!(!p.has_prereg_links);
        assert_eq!(p.prereg_links_status.as_deref(), Some("not_applicable"));

        let subject_ids: Vec<_> = rows.subjects.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(subject_ids, vec!["s1", "s2", "s3"]);

        assert_eq!(rows.contributors[0].osf_user_id, "u1");
        assert_eq!(
            rows.contributors[0].employment.as_deref(),
            Some(r#"[{"institution":"Uni"}]"#)
        );
        assert_eq!(rows.contributors[1].profile_url.as_deref(), Some("https://osf.io/u2/"));
    }

    #[test]
    fn missing_fields_become_empty() {
        let rows = extract(&json!({"id": "zzz99", "attributes": {}})).unwrap().into_rows();
        let p = &rows.preprint;
        assert_eq!(p.id, "zzz99");
        assert_eq!(p.title, None);
        assert_eq!(p.publication_doi, None);
        assert_eq!(p.contributors_list, None);
        assert_eq!(p.tags, "[]");
        assert!(!p.has_data_links);
        assert!(rows.contributors.is_empty());
    }

    #[test]
    fn failed_embeds_tolerated() {
        let doc = json!({
            "id": "abc12",
            "attributes": {"title": "T"},
            "embeds": {
                "license": {"errors": [{"detail": "Not found"}]},
                "contributors": {"errors": [{"detail": "Throttled"}]}
            }
        });
        let d = extract(&doc).unwrap();
        assert_eq!(d.license, None);
        assert!(d.contributors.is_empty());
    }
}
