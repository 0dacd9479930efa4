//! Normalized preprint tables and the transactional batch writer

use std::collections::BTreeSet;

use rusqlite::{OptionalExtension, Transaction, params};

use crate::db::Db;
use crate::error::StorageError;

/// One `preprints` row. JSON columns are pre-serialized strings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreprintRow {
    pub id: String,
    pub base_id: String,
    pub version: Option<i64>,
    pub is_latest_version: bool,
    pub provider: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub date_created: Option<String>,
    pub date_modified: Option<String>,
    pub date_published: Option<String>,
    pub original_publication_date: Option<String>,
    pub date_registered: Option<String>,
    pub doi: Option<String>,
    pub publication_doi: Option<String>,
    pub preprint_doi: Option<String>,
    pub license: Option<String>,
    pub download_url: Option<String>,
    pub is_published: Option<bool>,
    pub reviews_state: Option<String>,
    pub has_coi: Option<bool>,
    pub conflict_of_interest_statement: Option<String>,
    pub has_data_links: bool,
    pub data_links_status: Option<String>,
    pub data_links: String,
    pub why_no_data: Option<String>,
    pub has_prereg_links: bool,
    pub prereg_links_status: Option<String>,
    pub prereg_links: String,
    pub why_no_prereg: Option<String>,
    pub prereg_link_info: Option<String>,
    pub tags: String,
    pub subjects: String,
    pub contributors_list: Option<String>,
    pub first_author: Option<String>,
}

/// One `contributors` row; `None` fields never overwrite stored values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContributorRow {
    pub osf_user_id: String,
    pub full_name: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub date_registered: Option<String>,
    pub orcid: Option<String>,
    pub employment: Option<String>,
    pub education: Option<String>,
    pub profile_url: Option<String>,
}

/// Position of a contributor on one preprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authorship {
    pub osf_user_id: String,
    pub author_index: i64,
    pub bibliographic: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectRow {
    pub id: String,
    pub text: Option<String>,
}

/// Everything one raw document contributes to the normalized tables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedPreprint {
    pub preprint: PreprintRow,
    pub contributors: Vec<ContributorRow>,
    pub authorships: Vec<Authorship>,
    /// Ordered; position in this list is the stored position
    pub subjects: Vec<SubjectRow>,
}

/// One record's result within an ingest batch.
#[derive(Debug, Clone)]
pub enum BatchItem {
    Ingested {
        record_id: String,
        fetched_at: String,
        rows: Box<NormalizedPreprint>,
    },
    Failed {
        record_id: String,
        fetched_at: String,
        path: String,
        error: String,
    },
}

/// What a committed batch changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub ingested: usize,
    pub failed: usize,
    pub contributors: usize,
}

const UPSERT_PREPRINT: &str = "
INSERT INTO preprints (
    id, base_id, version, is_latest_version, provider, title, description,
    date_created, date_modified, date_published, original_publication_date, date_registered,
    doi, publication_doi, preprint_doi, license, download_url,
    is_published, reviews_state, has_coi, conflict_of_interest_statement,
    has_data_links, data_links_status, data_links, why_no_data,
    has_prereg_links, prereg_links_status, prereg_links, why_no_prereg, prereg_link_info,
    tags, subjects, contributors_list, first_author
) VALUES (
    ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17,
    ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28, ?29, ?30, ?31, ?32, ?33, ?34
)
ON CONFLICT(id) DO UPDATE SET
    base_id = excluded.base_id,
    version = excluded.version,
    is_latest_version = excluded.is_latest_version,
    provider = excluded.provider,
    title = excluded.title,
    description = excluded.description,
    date_created = excluded.date_created,
    date_modified = excluded.date_modified,
    date_published = excluded.date_published,
    original_publication_date = excluded.original_publication_date,
    date_registered = excluded.date_registered,
    doi = excluded.doi,
    publication_doi = excluded.publication_doi,
    preprint_doi = excluded.preprint_doi,
    license = excluded.license,
    download_url = excluded.download_url,
    is_published = excluded.is_published,
    reviews_state = excluded.reviews_state,
    has_coi = excluded.has_coi,
    conflict_of_interest_statement = excluded.conflict_of_interest_statement,
    has_data_links = excluded.has_data_links,
    data_links_status = excluded.data_links_status,
    data_links = excluded.data_links,
    why_no_data = excluded.why_no_data,
    has_prereg_links = excluded.has_prereg_links,
    prereg_links_status = excluded.prereg_links_status,
    prereg_links = excluded.prereg_links,
    why_no_prereg = excluded.why_no_prereg,
    prereg_link_info = excluded.prereg_link_info,
    tags = excluded.tags,
    subjects = excluded.subjects,
    contributors_list = excluded.contributors_list,
    first_author = excluded.first_author";

const UPSERT_CONTRIBUTOR: &str = "
INSERT INTO contributors (
    osf_user_id, full_name, given_name, family_name, date_registered,
    orcid, employment, education, profile_url
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
ON CONFLICT(osf_user_id) DO UPDATE SET
    full_name = COALESCE(excluded.full_name, contributors.full_name),
    given_name = COALESCE(excluded.given_name, contributors.given_name),
    family_name = COALESCE(excluded.family_name, contributors.family_name),
    date_registered = COALESCE(excluded.date_registered, contributors.date_registered),
    orcid = COALESCE(excluded.orcid, contributors.orcid),
    employment = COALESCE(excluded.employment, contributors.employment),
    education = COALESCE(excluded.education, contributors.education),
    profile_url = COALESCE(excluded.profile_url, contributors.profile_url)";

/// Highest version of a base id is the latest; ties break on id.
const REFRESH_LATEST: &str = "
UPDATE preprints SET is_latest_version = (
    id = (SELECT id FROM preprints q WHERE q.base_id = ?1
          ORDER BY COALESCE(q.version, 0) DESC, q.id DESC LIMIT 1)
)
WHERE base_id = ?1";

impl Db {
    /// Apply one ingest batch in a single transaction.
    ///
    /// Either every item lands (rows, ingest state, failure report) or
    /// nothing does; on error the transaction rolls back on drop.
    pub fn apply_batch(&self, items: &[BatchItem], now: &str) -> Result<BatchOutcome, StorageError> {
        let mut conn = self.lock_conn()?;
        let tx = conn.transaction()?;
        let mut outcome = BatchOutcome::default();
        let mut base_ids = BTreeSet::new();

        for item in items {
            match item {
                BatchItem::Ingested {
                    record_id,
                    fetched_at,
                    rows,
                } => {
                    outcome.contributors += write_preprint(&tx, rows)?;
                    base_ids.insert(rows.preprint.base_id.as_str());
                    tx.execute(
                        "INSERT INTO ingest_state (record_id, fetched_at, ingested_at) VALUES (?1, ?2, ?3) \
                         ON CONFLICT(record_id) DO UPDATE SET \
                           fetched_at = excluded.fetched_at, ingested_at = excluded.ingested_at",
                        params![record_id, fetched_at, now],
                    )?;
                    tx.execute(
                        "DELETE FROM ingest_failures WHERE record_id = ?1",
                        params![record_id],
                    )?;
                    outcome.ingested += 1;
                }
                BatchItem::Failed {
                    record_id,
                    fetched_at,
                    path,
                    error,
                } => {
                    tx.execute(
                        "INSERT INTO ingest_failures (record_id, fetched_at, path, error, failed_at) \
                         VALUES (?1, ?2, ?3, ?4, ?5) \
                         ON CONFLICT(record_id) DO UPDATE SET \
                           fetched_at = excluded.fetched_at, path = excluded.path, \
                           error = excluded.error, failed_at = excluded.failed_at",
                        params![record_id, fetched_at, path, error, now],
                    )?;
                    outcome.failed += 1;
                }
            }
        }

        {
            let mut refresh = tx.prepare_cached(REFRESH_LATEST)?;
            for base_id in &base_ids {
                refresh.execute(params![base_id])?;
            }
        }

        tx.commit()?;
        Ok(outcome)
    }

    /// Stored preprint by id.
    pub fn preprint(&self, id: &str) -> Result<Option<PreprintRow>, StorageError> {
        let conn = self.lock_conn()?;
        let row = conn
            .query_row(
                "SELECT id, base_id, version, is_latest_version, provider, title, description,
                        date_created, date_modified, date_published, original_publication_date,
                        date_registered, doi, publication_doi, preprint_doi, license, download_url,
                        is_published, reviews_state, has_coi, conflict_of_interest_statement,
                        has_data_links, data_links_status, data_links, why_no_data,
                        has_prereg_links, prereg_links_status, prereg_links, why_no_prereg,
                        prereg_link_info, tags, subjects, contributors_list, first_author
                 FROM preprints WHERE id = ?1",
                params![id],
                |r| {
                    Ok(PreprintRow {
                        id: r.get(0)?,
                        base_id: r.get(1)?,
                        version: r.get(2)?,
                        is_latest_version: r.get(3)?,
                        provider: r.get(4)?,
                        title: r.get(5)?,
                        description: r.get(6)?,
                        date_created: r.get(7)?,
                        date_modified: r.get(8)?,
                        date_published: r.get(9)?,
                        original_publication_date: r.get(10)?,
                        date_registered: r.get(11)?,
                        doi: r.get(12)?,
                        publication_doi: r.get(13)?,
                        preprint_doi: r.get(14)?,
                        license: r.get(15)?,
                        download_url: r.get(16)?,
                        is_published: r.get(17)?,
                        reviews_state: r.get(18)?,
                        has_coi: r.get(19)?,
                        conflict_of_interest_statement: r.get(20)?,
                        has_data_links: r.get(21)?,
                        data_links_status: r.get(22)?,
                        data_links: r.get(23)?,
                        why_no_data: r.get(24)?,
                        has_prereg_links: r.get(25)?,
                        prereg_links_status: r.get(26)?,
                        prereg_links: r.get(27)?,
                        why_no_prereg: r.get(28)?,
                        prereg_link_info: r.get(29)?,
                        tags: r.get(30)?,
                        subjects: r.get(31)?,
                        contributors_list: r.get(32)?,
                        first_author: r.get(33)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    /// Stored contributor by OSF user id.
    pub fn contributor(&self, osf_user_id: &str) -> Result<Option<ContributorRow>, StorageError> {
        let conn = self.lock_conn()?;
        let row = conn
            .query_row(
                "SELECT osf_user_id, full_name, given_name, family_name, date_registered,
                        orcid, employment, education, profile_url
                 FROM contributors WHERE osf_user_id = ?1",
                params![osf_user_id],
                |r| {
                    Ok(ContributorRow {
                        osf_user_id: r.get(0)?,
                        full_name: r.get(1)?,
                        given_name: r.get(2)?,
                        family_name: r.get(3)?,
                        date_registered: r.get(4)?,
                        orcid: r.get(5)?,
                        employment: r.get(6)?,
                        education: r.get(7)?,
                        profile_url: r.get(8)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    /// Contributor ids of a preprint in author order.
    pub fn preprint_authors(&self, preprint_id: &str) -> Result<Vec<Authorship>, StorageError> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT osf_user_id, author_index, bibliographic FROM preprint_contributors \
             WHERE preprint_id = ?1 ORDER BY author_index, osf_user_id",
        )?;
        let rows = stmt
            .query_map(params![preprint_id], |r| {
                Ok(Authorship {
                    osf_user_id: r.get(0)?,
                    author_index: r.get(1)?,
                    bibliographic: r.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Subject labels of a preprint in stored order.
    pub fn preprint_subject_labels(&self, preprint_id: &str) -> Result<Vec<String>, StorageError> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT COALESCE(s.text, s.id) FROM preprint_subjects ps \
             JOIN subjects s ON s.id = ps.subject_id \
             WHERE ps.preprint_id = ?1 ORDER BY ps.position",
        )?;
        let rows = stmt
            .query_map(params![preprint_id], |r| r.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(rows)
    }

    /// Preprint ids matching a full-text query, best match first.
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<String>, StorageError> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT p.id FROM preprints_fts f JOIN preprints p ON p.pk = f.rowid \
             WHERE preprints_fts MATCH ?1 ORDER BY rank LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![query, limit as i64], |r| r.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(rows)
    }
}

/// Upsert contributors, the preprint, and replace its join rows.
/// Returns the number of contributor rows touched.
fn write_preprint(tx: &Transaction<'_>, rows: &NormalizedPreprint) -> Result<usize, StorageError> {
    let p = &rows.preprint;

    {
        let mut stmt = tx.prepare_cached(UPSERT_CONTRIBUTOR)?;
        for c in &rows.contributors {
            stmt.execute(params![
                c.osf_user_id,
                c.full_name,
                c.given_name,
                c.family_name,
                c.date_registered,
                c.orcid,
                c.employment,
                c.education,
                c.profile_url,
            ])?;
        }
    }

    tx.prepare_cached(UPSERT_PREPRINT)?.execute(params![
        p.id,
        p.base_id,
        p.version,
        p.is_latest_version,
        p.provider,
        p.title,
        p.description,
        p.date_created,
        p.date_modified,
        p.date_published,
        p.original_publication_date,
        p.date_registered,
        p.doi,
        p.publication_doi,
        p.preprint_doi,
        p.license,
        p.download_url,
        p.is_published,
        p.reviews_state,
        p.has_coi,
        p.conflict_of_interest_statement,
        p.has_data_links,
        p.data_links_status,
        p.data_links,
        p.why_no_data,
        p.has_prereg_links,
        p.prereg_links_status,
        p.prereg_links,
        p.why_no_prereg,
        p.prereg_link_info,
        p.tags,
        p.subjects,
        p.contributors_list,
        p.first_author,
    ])?;

    tx.execute(
        "DELETE FROM preprint_contributors WHERE preprint_id = ?1",
        params![p.id],
    )?;
    {
        let mut stmt = tx.prepare_cached(
            "INSERT INTO preprint_contributors (preprint_id, osf_user_id, author_index, bibliographic) \
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        for a in &rows.authorships {
            stmt.execute(params![p.id, a.osf_user_id, a.author_index, a.bibliographic])?;
        }
    }

    tx.execute(
        "DELETE FROM preprint_subjects WHERE preprint_id = ?1",
        params![p.id],
    )?;
    {
        let mut upsert = tx.prepare_cached(
            "INSERT INTO subjects (id, text) VALUES (?1, ?2) \
             ON CONFLICT(id) DO UPDATE SET text = COALESCE(excluded.text, subjects.text)",
        )?;
        let mut link = tx.prepare_cached(
            "INSERT INTO preprint_subjects (preprint_id, subject_id, position) VALUES (?1, ?2, ?3)",
        )?;
        for (position, s) in rows.subjects.iter().enumerate() {
            upsert.execute(params![s.id, s.text])?;
            link.execute(params![p.id, s.id, position as i64])?;
        }
    }

    Ok(rows.contributors.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalized(id: &str, version: i64, title: &str) -> NormalizedPreprint {
        let base_id = id.split("_v").next().unwrap().to_string();
        NormalizedPreprint {
            preprint: PreprintRow {
                id: id.to_string(),
                base_id,
                version: Some(version),
                is_latest_version: true,
                provider: Some("psyarxiv".to_string()),
                title: Some(title.to_string()),
                data_links: "[]".to_string(),
                prereg_links: "[]".to_string(),
                tags: "[]".to_string(),
                subjects: "[\"Psychology\"]".to_string(),
                contributors_list: Some("Ada Lovelace".to_string()),
                first_author: Some("Ada Lovelace".to_string()),
                ..Default::default()
            },
            contributors: vec![ContributorRow {
                osf_user_id: "u1".to_string(),
                full_name: Some("Ada Lovelace".to_string()),
                orcid: Some("0000-0001".to_string()),
                ..Default::default()
            }],
            authorships: vec![Authorship {
                osf_user_id: "u1".to_string(),
                author_index: 0,
                bibliographic: true,
            }],
            subjects: vec![SubjectRow {
                id: "s1".to_string(),
                text: Some("Psychology".to_string()),
            }],
        }
    }

    fn ingested(rows: NormalizedPreprint) -> BatchItem {
        BatchItem::Ingested {
            record_id: rows.preprint.id.clone(),
            fetched_at: "2024-03-02T00:00:00.000000Z".to_string(),
            rows: Box::new(rows),
        }
    }

    const NOW: &str = "2024-03-03T00:00:00.000000Z";

    fn count(db: &Db, table: &str) -> i64 {
        let conn = db.lock_conn().unwrap();
        conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))
            .unwrap()
    }

    #[test]
    fn batch_writes_rows_and_state() {
        let db = Db::in_memory().unwrap();
        let outcome = db
            .apply_batch(&[ingested(normalized("abc12", 1, "Title"))], NOW)
            .unwrap();
        assert_eq!(outcome.ingested, 1);

        let p = db.preprint("abc12").unwrap().unwrap();
        assert_eq!(p.title.as_deref(), Some("Title"));
        assert!(p.is_latest_version);
        assert_eq!(db.contributor("u1").unwrap().unwrap().full_name.as_deref(), Some("Ada Lovelace"));
        assert_eq!(db.preprint_subject_labels("abc12").unwrap(), vec!["Psychology"]);
        assert_eq!(
            db.ingested_fetch("abc12").unwrap().as_deref(),
            Some("2024-03-02T00:00:00.000000Z")
        );
    }

    #[test]
    fn reapplying_is_idempotent() {
        let db = Db::in_memory().unwrap();
        let item = ingested(normalized("abc12", 1, "Title"));
        db.apply_batch(std::slice::from_ref(&item), NOW).unwrap();
        let first = db.preprint("abc12").unwrap();
        db.apply_batch(&[item], NOW).unwrap();

        assert_eq!(db.preprint("abc12").unwrap(), first);
        assert_eq!(count(&db, "preprints"), 1);
        assert_eq!(count(&db, "contributors"), 1);
        assert_eq!(count(&db, "preprint_contributors"), 1);
        assert_eq!(count(&db, "preprint_subjects"), 1);
    }

    #[test]
    fn contributor_fields_not_erased_by_sparse_update() {
        let db = Db::in_memory().unwrap();
        db.apply_batch(&[ingested(normalized("abc12", 1, "Title"))], NOW).unwrap();

        let mut sparse = normalized("xyz99", 1, "Other");
        sparse.contributors[0].orcid = None;
        sparse.contributors[0].full_name = Some("Ada King".to_string());
        db.apply_batch(&[ingested(sparse)], NOW).unwrap();

        let c = db.contributor("u1").unwrap().unwrap();
        assert_eq!(c.full_name.as_deref(), Some("Ada King"));
        assert_eq!(c.orcid.as_deref(), Some("0000-0001"));
    }

    #[test]
    fn latest_version_recomputed() {
        let db = Db::in_memory().unwrap();
        db.apply_batch(
            &[
                ingested(normalized("abc12_v2", 2, "Second")),
                ingested(normalized("abc12_v1", 1, "First")),
            ],
            NOW,
        )
        .unwrap();
        assert!(!db.preprint("abc12_v1").unwrap().unwrap().is_latest_version);
        assert!(db.preprint("abc12_v2").unwrap().unwrap().is_latest_version);

        db.apply_batch(&[ingested(normalized("abc12_v3", 3, "Third"))], NOW).unwrap();
        assert!(!db.preprint("abc12_v2").unwrap().unwrap().is_latest_version);
        assert!(db.preprint("abc12_v3").unwrap().unwrap().is_latest_version);
    }

    #[test]
    fn failures_recorded_then_cleared() {
        let db = Db::in_memory().unwrap();
        db.apply_batch(
            &[BatchItem::Failed {
                record_id: "abc12".to_string(),
                fetched_at: "2024-03-02T00:00:00.000000Z".to_string(),
                path: "psyarxiv/2024/03/01/abc12.json".to_string(),
                error: "not JSON".to_string(),
            }],
            NOW,
        )
        .unwrap();
        assert_eq!(db.ingest_failures().unwrap().len(), 1);
        assert_eq!(db.ingested_fetch("abc12").unwrap(), None);

        db.apply_batch(&[ingested(normalized("abc12", 1, "Title"))], NOW).unwrap();
        assert!(db.ingest_failures().unwrap().is_empty());
    }

    #[test]
    fn full_text_index_follows_updates() {
        let db = Db::in_memory().unwrap();
        db.apply_batch(&[ingested(normalized("abc12", 1, "Replication crisis"))], NOW).unwrap();
        db.apply_batch(&[ingested(normalized("def34", 1, "Open data"))], NOW).unwrap();
        assert_eq!(db.search("replication", 10).unwrap(), vec!["abc12"]);
        assert_eq!(db.search("lovelace", 10).unwrap().len(), 2);

        db.apply_batch(&[ingested(normalized("abc12", 1, "Priming effects"))], NOW).unwrap();
        assert!(db.search("replication", 10).unwrap().is_empty());
        assert_eq!(db.search("priming", 10).unwrap(), vec!["abc12"]);
        assert_eq!(db.search("lovelace", 10).unwrap().len(), 2);
    }

    #[test]
    fn failed_batch_leaves_no_rows() {
        let db = Db::in_memory().unwrap();
        db.lock_conn()
            .unwrap()
            .execute_batch(
                "CREATE TRIGGER reject_def34 BEFORE INSERT ON preprints
                 WHEN NEW.id = 'def34'
                 BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
            )
            .unwrap();

        let result = db.apply_batch(
            &[
                ingested(normalized("abc12", 1, "First")),
                ingested(normalized("def34", 1, "Second")),
            ],
            NOW,
        );
        assert!(result.is_err());
        assert_eq!(count(&db, "preprints"), 0);
        assert_eq!(count(&db, "contributors"), 0);
        assert_eq!(count(&db, "ingest_state"), 0);
        assert_eq!(db.ingested_fetch("abc12").unwrap(), None);
    }

    #[test]
    fn ui_view_flattens_lists() {
        let db = Db::in_memory().unwrap();
        let mut rows = normalized("abc12", 1, "Title");
        rows.preprint.tags = "[\"memory\",\"sleep\"]".to_string();
        rows.subjects.push(SubjectRow {
            id: "s2".to_string(),
            text: Some("Cognitive Psychology".to_string()),
        });
        db.apply_batch(&[ingested(rows)], NOW).unwrap();

        let conn = db.lock_conn().unwrap();
        let (subjects, tags, n): (String, String, i64) = conn
            .query_row(
                "SELECT subjects_list, tags_list, contributor_count FROM preprints_ui WHERE id = 'abc12'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .unwrap();
        assert_eq!(subjects, "Psychology; Cognitive Psychology");
        assert_eq!(tags, "memory; sleep");
        assert_eq!(n, 1);
    }
}
