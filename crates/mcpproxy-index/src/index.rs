//! `ToolIndex`: the Tantivy-backed BM25 index over `(server, tool)`
//! documents, with the differential update algorithm 

use mcpproxy_core::domain::ToolDocument;
use mcpproxy_protocol::Tool;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use tantivy::collector::TopDocs;
use tantivy::query::{QueryParser, TermQuery};
use tantivy::schema::{Field, IndexRecordOption, Schema, TantivyDocument, Value as SchemaValue, FAST, STORED, STRING, TEXT};
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, Term};

use crate::document::{content_hash, flatten_schema_text, DiffOutcome};
use crate::error::IndexError;

const WRITER_HEAP_BYTES: usize = 32 * 1024 * 1024;

struct Fields {
    qualified_name: Field,
    server: Field,
    name: Field,
    description: Field,
    schema_text: Field,
    doc_json: Field,
}

fn build_schema() -> (Schema, Fields) {
    let mut builder = Schema::builder();
    let qualified_name = builder.add_text_field("qualified_name", STRING | STORED | FAST);
    let server = builder.add_text_field("server", STRING | STORED | FAST);
    let name = builder.add_text_field("name", TEXT | STORED);
    let description = builder.add_text_field("description", TEXT | STORED);
    let schema_text = builder.add_text_field("schema_text", TEXT);
    let doc_json = builder.add_text_field("doc_json", STORED);
    let schema = builder.build();
    (
        schema,
        Fields {
            qualified_name,
            server,
            name,
            description,
            schema_text,
            doc_json,
        },
    )
}

/// One search hit: the full tool document plus its score, normalized per
/// response so the max-scoring hit is `1.0`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SearchHit {
    pub doc: ToolDocument,
    pub score: f32,
}

/// BM25 full-text index over the tool catalogue. One instance is
/// shared process-wide; writes are serialized per-server by the caller
/// (the owning upstream actor), reads take a lock-free reader snapshot
pub struct ToolIndex {
    index: Index,
    writer: Mutex<IndexWriter>,
    reader: IndexReader,
    fields: Fields,
    /// Side bookkeeping of `qualifiedName -> content hash` per server,
    /// used to compute the set differences `apply_diff` needs without a
    /// round trip through Tantivy's own query engine.
    server_docs: Mutex<HashMap<String, HashMap<String, u64>>>,
}

impl ToolIndex {
    /// An in-memory index, sufficient for mcpproxy's lifetime (the index
    /// is rebuilt from live upstream discovery on every restart; nothing
    /// about the catalogue itself needs to survive a process restart).
    pub fn in_memory() -> Result<Self, IndexError> {
        let (schema, fields) = build_schema();
        let index = Index::create_in_ram(schema);
        let writer = index.writer(WRITER_HEAP_BYTES)?;
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;
        Ok(Self {
            index,
            writer: Mutex::new(writer),
            reader,
            fields,
            server_docs: Mutex::new(HashMap::new()),
        })
    }

    /// `ApplyDiff(server, tools)`: after this call, the
    /// set of `qualifiedName`s under `server` is exactly
    /// `{server + ":" + t.name | t in tools}`, idempotent when called
    /// twice with the same `tools`.
    pub fn apply_diff(&self, server: &str, tools: &[Tool]) -> Result<DiffOutcome, IndexError> {
        let next: HashMap<String, (ToolDocument, u64)> = tools
            .iter()
            .map(|t| {
                let doc = ToolDocument::from_tool(server, t);
                let hash = content_hash(&doc);
                (doc.qualified_name.clone(), (doc, hash))
            })
            .collect();
        let next_names: HashSet<&String> = next.keys().collect();

        let mut server_docs = self.server_docs.lock();
        let prev = server_docs.entry(server.to_string()).or_default();
        let prev_names: HashSet<String> = prev.keys().cloned().collect();

        let mut outcome = DiffOutcome {
            server: server.to_string(),
            ..Default::default()
        };

        let mut writer = self.writer.lock();

        for qn in prev_names.iter() {
            if !next_names.contains(qn) {
                writer.delete_term(Term::from_field_text(self.fields.qualified_name, qn));
                outcome.removed.push(qn.clone());
            }
        }

        for (qn, (doc, hash)) in &next {
            match prev.get(qn) {
                None => {
                    self.add_document(&mut writer, doc)?;
                    outcome.added.push(qn.clone());
                }
                Some(prev_hash) if prev_hash != hash => {
                    writer.delete_term(Term::from_field_text(self.fields.qualified_name, qn));
                    self.add_document(&mut writer, doc)?;
                    outcome.replaced.push(qn.clone());
                }
                Some(_) => {}
            }
        }

        writer.commit()?;
        drop(writer);
        self.reader.reload()?;

        *prev = next.into_iter().map(|(qn, (_, hash))| (qn, hash)).collect();

        Ok(outcome)
    }

    /// Removes every tool under `server`, e.g. on quarantine or removal
    pub fn remove_server(&self, server: &str) -> Result<DiffOutcome, IndexError> {
        self.apply_diff(server, &[])
    }

    fn add_document(&self, writer: &mut IndexWriter, doc: &ToolDocument) -> Result<(), IndexError> {
        let schema_text = flatten_schema_text(&doc.input_schema);
        let json_blob = serde_json::to_string(doc)?;
        writer.add_document(doc!(
            self.fields.qualified_name => doc.qualified_name.clone(),
            self.fields.server => doc.server.clone(),
            self.fields.name => doc.tool_name.clone(),
            self.fields.description => doc.description.clone(),
            self.fields.schema_text => schema_text,
            self.fields.doc_json => json_blob,
        ))?;
        Ok(())
    }

    /// Looks up a single tool by its exact `qualifiedName`, used by
    /// dispatch to recover a tool's server-declared annotations before
    /// validating intent.
    pub fn get(&self, qualified_name: &str) -> Result<Option<ToolDocument>, IndexError> {
        let searcher = self.reader.searcher();
        let term = Term::from_field_text(self.fields.qualified_name, qualified_name);
        let query = TermQuery::new(term, IndexRecordOption::Basic);
        let top = searcher.search(&query, &TopDocs::with_limit(1))?;
        let Some((_, address)) = top.into_iter().next() else {
            return Ok(None);
        };
        let retrieved: TantivyDocument = searcher.doc(address)?;
        let Some(blob) = retrieved.get_first(self.fields.doc_json).and_then(|v| v.as_str()) else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_str(blob)?))
    }

    /// Number of tools currently indexed under `server`.
    pub fn tool_count(&self, server: &str) -> usize {
        self.server_docs
            .lock()
            .get(server)
            .map(HashMap::len)
            .unwrap_or(0)
    }

    /// `Search(query, limit)`: BM25 over
    /// `name + description + flattened-schema-fields`, scores normalized
    /// so the top hit is `1.0`, ties broken lexicographically by
    /// `qualifiedName`.
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, IndexError> {
        let searcher = self.reader.searcher();
        let parser = QueryParser::for_index(
            &self.index,
            vec![self.fields.name, self.fields.description, self.fields.schema_text],
        );
        let parsed = parser
            .parse_query(query)
            .map_err(|e| IndexError::QueryParse(e.to_string()))?;

        let top = searcher.search(&parsed, &TopDocs::with_limit(limit.max(1)))?;
        let mut hits = Vec::with_capacity(top.len());
        for (score, address) in top {
            let retrieved: TantivyDocument = searcher.doc(address)?;
            let Some(blob) = retrieved.get_first(self.fields.doc_json).and_then(|v| v.as_str()) else {
                continue;
            };
            let doc: ToolDocument = serde_json::from_str(blob)?;
            hits.push(SearchHit { doc, score });
        }

        let max_score = hits.iter().map(|h| h.score).fold(0.0_f32, f32::max);
        if max_score > 0.0 {
            for hit in &mut hits {
                hit.score /= max_score;
            }
        }
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.doc.qualified_name.cmp(&b.doc.qualified_name))
        });
        hits.truncate(limit);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool(name: &str, description: &str) -> Tool {
        Tool {
            name: name.to_string(),
            description: Some(description.to_string()),
            input_schema: Default::default(),
            annotations: None,
        }
    }

    #[test]
    fn apply_diff_adds_and_matches_next_set() {
        let index = ToolIndex::in_memory().unwrap();
        let outcome = index
            .apply_diff("github", &[tool("list_repos", "list repositories"), tool("delete_repo", "delete a repo")])
            .unwrap();
        assert_eq!(outcome.added.len(), 2);
        assert_eq!(index.tool_count("github"), 2);
    }

    #[test]
    fn apply_diff_is_idempotent() {
        let index = ToolIndex::in_memory().unwrap();
        let tools = vec![tool("a", "tool a"), tool("b", "tool b")];
        index.apply_diff("s", &tools).unwrap();
        let second = index.apply_diff("s", &tools).unwrap();
        assert!(second.is_empty(), "re-applying the same set must be a no-op");
    }

    #[test]
    fn apply_diff_computes_add_remove_replace() {
        let index = ToolIndex::in_memory().unwrap();
        index.apply_diff("s", &[tool("a", "tool a"), tool("b", "tool b")]).unwrap();

        let outcome = index
            .apply_diff("s", &[tool("b", "tool b updated"), tool("c", "tool c")])
            .unwrap();
        assert_eq!(outcome.removed, vec!["s:a".to_string()]);
        assert_eq!(outcome.added, vec!["s:c".to_string()]);
        assert_eq!(outcome.replaced, vec!["s:b".to_string()]);
        assert_eq!(index.tool_count("s"), 2);
    }

    #[test]
    fn search_finds_recently_added_tool_at_rank_one() {
        let index = ToolIndex::in_memory().unwrap();
        index.apply_diff("s", &[tool("b", "tool b"), tool("c", "unique_marker_tool")]).unwrap();
        let hits = index.search("unique_marker_tool", 5).unwrap();
        assert_eq!(hits[0].doc.qualified_name, "s:c");
        assert_eq!(hits[0].score, 1.0);
    }

    #[test]
    fn search_ties_break_lexicographically() {
        let index = ToolIndex::in_memory().unwrap();
        index
            .apply_diff(
                "s",
                &[tool("zeta", "widget helper"), tool("alpha", "widget helper")],
            )
            .unwrap();
        let hits = index.search("widget", 5).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].doc.qualified_name, "s:alpha");
        assert_eq!(hits[1].doc.qualified_name, "s:zeta");
    }

    #[test]
    fn get_looks_up_a_single_tool_by_qualified_name() {
        let index = ToolIndex::in_memory().unwrap();
        index.apply_diff("s", &[tool("a", "tool a")]).unwrap();
        let found = index.get("s:a").unwrap().expect("tool should be indexed");
        assert_eq!(found.tool_name, "a");
        assert!(index.get("s:missing").unwrap().is_none());
    }

    #[test]
    fn remove_server_clears_all_tools() {
        let index = ToolIndex::in_memory().unwrap();
        index.apply_diff("s", &[tool("a", "tool a")]).unwrap();
        let outcome = index.remove_server("s").unwrap();
        assert_eq!(outcome.removed, vec!["s:a".to_string()]);
        assert_eq!(index.tool_count("s"), 0);
    }
}
