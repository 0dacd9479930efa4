use prepline_osf::extract;
use serde_json::{Value, json};

fn jsonapi_doc(contributors: usize) -> Value {
    let embedded: Vec<Value> = (0..contributors)
        .map(|i| {
            json!({
                "attributes": {"index": i, "bibliographic": i % 4 != 3},
                "relationships": {"users": {"data": {"id": format!("u{i:04}")}}},
                "embeds": {"users": {"data": {
                    "id": format!("u{i:04}"),
                    "attributes": {
                        "full_name": format!("Author Number {i}"),
                        "employment": [{"institution": "University", "title": "Researcher"}],
                        "social": {"orcid": "0000-0002-1825-0097"}
                    },
                    "links": {"html": format!("https://osf.io/u{i:04}/")}
                }}}
            })
        })
        .collect();
    json!({
        "id": "abc12_v3",
        "attributes": {
            "title": "A registered report on something replicable",
            "description": "Lorem ipsum dolor sit amet. ".repeat(40),
            "date_created": "2024-02-28T10:00:00.000000",
            "date_modified": "2024-03-01T12:30:00.000000",
            "doi": "10.1234/xyz",
            "tags": ["replication; open science", "preregistration, psychology"],
            "subjects": [
                [{"id": "s1", "text": "Social and Behavioral Sciences"}, {"id": "s2", "text": "Psychology"}],
                [{"id": "s1", "text": "Social and Behavioral Sciences"}, {"id": "s3", "text": "Cognitive Psychology"}]
            ],
            "has_data_links": "available",
            "data_links": ["https://osf.io/data1"]
        },
        "relationships": {
            "provider": {"data": {"id": "psyarxiv"}},
            "primary_file": {"data": {"id": "f00d1"}}
        },
        "embeds": {
            "license": {"data": {"attributes": {"name": "CC-By Attribution 4.0 International"}}},
            "contributors": {"data": embedded}
        }
    })
}

#[divan::bench(args = [1, 8, 64])]
fn extract_jsonapi(bencher: divan::Bencher, contributors: usize) {
    let doc = jsonapi_doc(contributors);
    bencher.bench(|| extract(divan::black_box(&doc)).map(|d| d.into_rows()));
}

#[divan::bench]
fn extract_flat(bencher: divan::Bencher) {
    let doc = json!({
        "record_id": "abc12",
        "title": "T",
        "subjects": ["Psychology", "Neuroscience"],
        "contributors": [{"id": "u1", "name": "A"}, {"id": "u2", "name": "B"}]
    });
    bencher.bench(|| extract(divan::black_box(&doc)).map(|d| d.into_rows()));
}

fn main() {
    divan::main();
}
