//! `.apkg` writer: an Anki collection (SQLite, schema 11) inside a zip.
//!
//! The package holds two entries: `collection.anki2`, the database with one
//! note type, one deck and the notes/cards, and `media`, an empty JSON map.

use crate::deck::ids::DeckIds;
use crate::deck::text::{clean_text, field_checksum, guid_for, strip_html};
use crate::deck::Deck;
use crate::error::Pdf2AnkiError;
use serde_json::{json, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode};
use sqlx::{Connection, SqliteConnection};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

pub const COLLECTION_ENTRY: &str = "collection.anki2";
pub const MEDIA_ENTRY: &str = "media";

pub const MODEL_NAME: &str = "Simple Model";
pub const FIELD_NAMES: [&str; 2] = ["Question", "Answer"];
pub const TEMPLATE_NAME: &str = "Card 1";
pub const QUESTION_FORMAT: &str = "{{Question}}";
pub const ANSWER_FORMAT: &str = "{{FrontSide}}<hr id=\"answer\">{{Answer}}";

const FIELD_SEPARATOR: char = '\u{1f}';

const CARD_CSS: &str = ".card {\n font-family: arial;\n font-size: 20px;\n text-align: center;\n color: black;\n background-color: white;\n}\n";

const LATEX_PRE: &str = "\\documentclass[12pt]{article}\n\\special{papersize=3in,5in}\n\\usepackage[utf8]{inputenc}\n\\usepackage{amssymb,amsmath}\n\\pagestyle{empty}\n\\setlength{\\parindent}{0in}\n\\begin{document}\n";

const SCHEMA: &str = r#"
CREATE TABLE col (
    id              integer primary key,
    crt             integer not null,
    mod             integer not null,
    scm             integer not null,
    ver             integer not null,
    dty             integer not null,
    usn             integer not null,
    ls              integer not null,
    conf            text not null,
    models          text not null,
    decks           text not null,
    dconf           text not null,
    tags            text not null
);
CREATE TABLE notes (
    id              integer primary key,
    guid            text not null,
    mid             integer not null,
    mod             integer not null,
    usn             integer not null,
    tags            text not null,
    flds            text not null,
    sfld            integer not null,
    csum            integer not null,
    flags           integer not null,
    data            text not null
);
CREATE TABLE cards (
    id              integer primary key,
    nid             integer not null,
    did             integer not null,
    ord             integer not null,
    mod             integer not null,
    usn             integer not null,
    type            integer not null,
    queue           integer not null,
    due             integer not null,
    ivl             integer not null,
    factor          integer not null,
    reps            integer not null,
    lapses          integer not null,
    left            integer not null,
    odue            integer not null,
    odid            integer not null,
    flags           integer not null,
    data            text not null
);
CREATE TABLE revlog (
    id              integer primary key,
    cid             integer not null,
    usn             integer not null,
    ease            integer not null,
    ivl             integer not null,
    lastIvl         integer not null,
    factor          integer not null,
    time            integer not null,
    type            integer not null
);
CREATE TABLE graves (
    usn             integer not null,
    oid             integer not null,
    type            integer not null
);
CREATE INDEX ix_notes_usn on notes (usn);
CREATE INDEX ix_cards_usn on cards (usn);
CREATE INDEX ix_revlog_usn on revlog (usn);
CREATE INDEX ix_cards_nid on cards (nid);
CREATE INDEX ix_cards_sched on cards (did, queue, due);
CREATE INDEX ix_revlog_cid on revlog (cid);
CREATE INDEX ix_notes_csum on notes (csum);
"#;

/// The schema split into single statements, in creation order.
fn schema_statements() -> impl Iterator<Item = &'static str> {
    SCHEMA.split(';').map(str::trim).filter(|s| !s.is_empty())
}

/// Write the collection database for `deck` to `db_path`.
///
/// Returns the number of notes written.
pub async fn write_collection(
    db_path: &Path,
    deck: &Deck,
    ids: DeckIds,
) -> Result<usize, Pdf2AnkiError> {
    let db_err = |e: sqlx::Error| Pdf2AnkiError::packaging(db_path, e);

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| Pdf2AnkiError::Internal(format!("system clock: {e}")))?;
    let now_secs = now.as_secs() as i64;
    let now_ms = now.as_millis() as i64;

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Delete);
    let mut conn = SqliteConnection::connect_with(&options).await.map_err(db_err)?;

    for statement in schema_statements() {
        sqlx::query(statement)
            .execute(&mut conn)
            .await
            .map_err(db_err)?;
    }

    let mut tx = conn.begin().await.map_err(db_err)?;

    sqlx::query(
        r#"
        INSERT INTO col (id, crt, mod, scm, ver, dty, usn, ls, conf, models, decks, dconf, tags)
        VALUES (1, ?1, ?2, ?3, 11, 0, 0, 0, ?4, ?5, ?6, ?7, '{}')
        "#,
    )
    .bind(now_secs)
    .bind(now_ms)
    .bind(now_ms)
    .bind(collection_conf(ids).to_string())
    .bind(models_json(ids, now_secs).to_string())
    .bind(decks_json(deck.name(), ids, now_secs).to_string())
    .bind(deck_conf_json().to_string())
    .execute(&mut *tx)
    .await
    .map_err(db_err)?;

    let note_count = deck.cards().len() as i64;
    for (i, card) in deck.cards().iter().enumerate() {
        let question = clean_text(card.front());
        let answer = clean_text(card.back());
        let note_id = now_ms + i as i64;
        let card_id = now_ms + note_count + i as i64;
        let flds = format!("{question}{FIELD_SEPARATOR}{answer}");

        sqlx::query(
            r#"
            INSERT INTO notes (id, guid, mid, mod, usn, tags, flds, sfld, csum, flags, data)
            VALUES (?1, ?2, ?3, ?4, -1, '', ?5, ?6, ?7, 0, '')
            "#,
        )
        .bind(note_id)
        .bind(guid_for(&[question.as_str(), answer.as_str()]))
        .bind(ids.model_id)
        .bind(now_secs)
        .bind(flds)
        .bind(strip_html(&question))
        .bind(field_checksum(&question))
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        sqlx::query(
            r#"
            INSERT INTO cards (id, nid, did, ord, mod, usn, type, queue, due,
                               ivl, factor, reps, lapses, left, odue, odid, flags, data)
            VALUES (?1, ?2, ?3, 0, ?4, -1, 0, 0, ?5, 0, 0, 0, 0, 0, 0, 0, 0, '')
            "#,
        )
        .bind(card_id)
        .bind(note_id)
        .bind(ids.deck_id)
        .bind(now_secs)
        .bind(i as i64)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;
    }

    tx.commit().await.map_err(db_err)?;
    conn.close().await.map_err(db_err)?;

    debug!("Wrote {} notes to {}", note_count, db_path.display());
    Ok(deck.cards().len())
}

/// Zip the collection at `db_path` into an `.apkg` at `apkg_path`.
///
/// Blocking; call from `spawn_blocking`.
pub fn write_package(db_path: &Path, apkg_path: &Path) -> Result<u64, Pdf2AnkiError> {
    let zip_err = |e: zip::result::ZipError| Pdf2AnkiError::packaging(apkg_path, e);
    let io_err = |e: std::io::Error| Pdf2AnkiError::packaging(apkg_path, e);

    let file = File::create(apkg_path).map_err(io_err)?;
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    writer.start_file(COLLECTION_ENTRY, options).map_err(zip_err)?;
    let mut db = File::open(db_path).map_err(io_err)?;
    std::io::copy(&mut db, &mut writer).map_err(io_err)?;

    writer.start_file(MEDIA_ENTRY, options).map_err(zip_err)?;
    writer.write_all(b"{}").map_err(io_err)?;

    let file = writer.finish().map_err(zip_err)?;
    file.sync_all().map_err(io_err)?;
    let len = file.metadata().map_err(io_err)?.len();
    debug!("Packaged {} ({} bytes)", apkg_path.display(), len);
    Ok(len)
}

fn collection_conf(ids: DeckIds) -> Value {
    json!({
        "activeDecks": [1],
        "addToCur": true,
        "collapseTime": 1200,
        "curDeck": ids.deck_id,
        "curModel": ids.model_id.to_string(),
        "dueCounts": true,
        "estTimes": true,
        "newBury": true,
        "newSpread": 0,
        "nextPos": 1,
        "sortBackwards": false,
        "sortType": "noteFld",
        "timeLim": 0
    })
}

fn models_json(ids: DeckIds, now_secs: i64) -> Value {
    let fields: Vec<Value> = FIELD_NAMES
        .iter()
        .enumerate()
        .map(|(ord, name)| {
            json!({
                "name": name,
                "ord": ord,
                "font": "Arial",
                "media": [],
                "rtl": false,
                "size": 20,
                "sticky": false
            })
        })
        .collect();

    let model = json!({
        "id": ids.model_id,
        "name": MODEL_NAME,
        "type": 0,
        "mod": now_secs,
        "usn": -1,
        "sortf": 0,
        "did": ids.deck_id,
        "tmpls": [{
            "name": TEMPLATE_NAME,
            "ord": 0,
            "qfmt": QUESTION_FORMAT,
            "afmt": ANSWER_FORMAT,
            "bqfmt": "",
            "bafmt": "",
            "did": null
        }],
        "flds": fields,
        "css": CARD_CSS,
        "latexPre": LATEX_PRE,
        "latexPost": "\\end{document}",
        "tags": [],
        "vers": [],
        "req": [[0, "all", [0]]]
    });

    let mut models = serde_json::Map::new();
    models.insert(ids.model_id.to_string(), model);
    Value::Object(models)
}

fn deck_entry(id: i64, name: &str, now_secs: i64) -> Value {
    json!({
        "id": id,
        "name": name,
        "desc": "",
        "mod": now_secs,
        "usn": -1,
        "collapsed": false,
        "browserCollapsed": false,
        "conf": 1,
        "dyn": 0,
        "extendNew": 10,
        "extendRev": 50,
        "newToday": [0, 0],
        "revToday": [0, 0],
        "lrnToday": [0, 0],
        "timeToday": [0, 0]
    })
}

fn decks_json(name: &str, ids: DeckIds, now_secs: i64) -> Value {
    let mut decks = serde_json::Map::new();
    decks.insert("1".into(), deck_entry(1, "Default", now_secs));
    decks.insert(ids.deck_id.to_string(), deck_entry(ids.deck_id, name, now_secs));
    Value::Object(decks)
}

fn deck_conf_json() -> Value {
    json!({
        "1": {
            "id": 1,
            "name": "Default",
            "mod": 0,
            "usn": 0,
            "maxTaken": 60,
            "autoplay": true,
            "timer": 0,
            "replayq": true,
            "dyn": false,
            "new": {
                "bury": true,
                "delays": [1, 10],
                "initialFactor": 2500,
                "ints": [1, 4, 7],
                "order": 1,
                "perDay": 20,
                "separate": true
            },
            "lapse": {
                "delays": [10],
                "leechAction": 0,
                "leechFails": 8,
                "minInt": 1,
                "mult": 0
            },
            "rev": {
                "bury": true,
                "ease4": 1.3,
                "fuzz": 0.05,
                "ivlFct": 1,
                "maxIvl": 36500,
                "minSpace": 1,
                "perDay": 100
            }
        }
    })
}
