//! File-backed dataset: a directory of N-Quads files.
//!
//! Every quad's graph label registers a named graph. Quads whose object is a
//! `geo:wktLiteral` contribute a geometry keyed by the quad's subject.

use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use geoindex_core::{GraphName, IndexError, Result};

use crate::dataset::{Dataset, GeometryRecord, GraphScope, MemoryDataset};
use crate::wkt::{parse_wkt_literal, WKT_LITERAL};

/// An RDF term as it appears in an N-Quads line.
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    Iri(String),
    Blank(String),
    Literal {
        lexical: String,
        datatype: Option<String>,
        lang: Option<String>,
    },
}

impl Term {
    /// IRI or `_:label` form used as a resource identifier.
    fn resource_id(&self) -> Option<String> {
        match self {
            Term::Iri(iri) => Some(iri.clone()),
            Term::Blank(label) => Some(format!("_:{label}")),
            Term::Literal { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Quad {
    pub subject: Term,
    pub predicate: Term,
    pub object: Term,
    pub graph: Option<Term>,
}

/// Dataset loaded from `*.nq` files under a location.
pub struct QuadFileDataset {
    location: PathBuf,
    inner: MemoryDataset,
}

impl QuadFileDataset {
    /// Open a dataset from a directory of `.nq` files or a single file.
    ///
    /// A missing location yields an empty dataset, like connecting to a
    /// fresh store.
    pub fn open(location: impl AsRef<Path>) -> Result<Self> {
        let location = location.as_ref().to_path_buf();
        let mut inner = MemoryDataset::new();

        if !location.exists() {
            tracing::warn!(location = %location.display(), "Dataset location does not exist, using an empty dataset");
            return Ok(Self { location, inner });
        }

        let files = if location.is_dir() {
            let mut files: Vec<PathBuf> = fs::read_dir(&location)?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| {
                    p.is_file()
                        && matches!(
                            p.extension().and_then(|e| e.to_str()),
                            Some("nq") | Some("nquads")
                        )
                })
                .collect();
            files.sort();
            files
        } else {
            vec![location.clone()]
        };

        for file in &files {
            let reader = BufReader::new(File::open(file)?);
            load_quads(reader, &file.display().to_string(), &mut inner)?;
        }

        tracing::info!(
            location = %location.display(),
            files = files.len(),
            geometries = inner.geometry_count(),
            "Dataset opened"
        );

        Ok(Self { location, inner })
    }

    /// Parse N-Quads from any reader.
    pub fn from_reader(reader: impl BufRead, source: &str) -> Result<Self> {
        let mut inner = MemoryDataset::new();
        load_quads(reader, source, &mut inner)?;
        Ok(Self {
            location: PathBuf::from(source),
            inner,
        })
    }

    pub fn location(&self) -> &Path {
        &self.location
    }
}

impl Dataset for QuadFileDataset {
    fn graph_names(&self) -> Result<Vec<GraphName>> {
        self.inner.graph_names()
    }

    fn geometries(&self, scope: GraphScope<'_>) -> Result<Vec<GeometryRecord>> {
        self.inner.geometries(scope)
    }
}

fn load_quads(reader: impl BufRead, source: &str, dataset: &mut MemoryDataset) -> Result<()> {
    let mut skipped = 0usize;

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        let quad = match parse_quad(&line) {
            Ok(Some(q)) => q,
            Ok(None) => continue,
            Err(reason) => {
                tracing::warn!(source, line = line_no + 1, %reason, "Skipping malformed quad");
                skipped += 1;
                continue;
            }
        };

        let graph = match &quad.graph {
            Some(term) => {
                let name = term.resource_id().map(GraphName).ok_or_else(|| {
                    IndexError::Dataset(format!(
                        "{source}:{}: graph label must be an IRI or blank node",
                        line_no + 1
                    ))
                })?;
                dataset.add_graph(name.clone());
                Some(name)
            }
            None => None,
        };

        let Term::Literal {
            lexical,
            datatype: Some(datatype),
            ..
        } = &quad.object
        else {
            continue;
        };
        if datatype != WKT_LITERAL {
            continue;
        }
        let Some(feature) = quad.subject.resource_id() else {
            continue;
        };

        match parse_wkt_literal(lexical) {
            Ok(Some(parsed)) => dataset.insert(
                graph.as_ref(),
                GeometryRecord::new(feature, parsed.srs, parsed.envelope),
            ),
            Ok(None) => {}
            Err(reason) => {
                tracing::warn!(source, line = line_no + 1, %reason, "Skipping unreadable WKT literal");
                skipped += 1;
            }
        }
    }

    if skipped > 0 {
        tracing::warn!(source, skipped, "Some quads could not be read");
    }
    Ok(())
}

/// Parse one N-Quads line. Blank lines and comments yield `Ok(None)`.
pub fn parse_quad(line: &str) -> std::result::Result<Option<Quad>, String> {
    let mut cursor = Cursor { rest: line.trim() };
    if cursor.rest.is_empty() || cursor.rest.starts_with('#') {
        return Ok(None);
    }

    let subject = cursor.term()?;
    let predicate = cursor.term()?;
    let object = cursor.term()?;

    cursor.skip_ws();
    let graph = if cursor.rest.starts_with('.') {
        None
    } else {
        Some(cursor.term()?)
    };

    cursor.skip_ws();
    if !cursor.rest.starts_with('.') {
        return Err("expected '.' at end of quad".to_string());
    }
    if matches!(subject, Term::Literal { .. }) {
        return Err("subject cannot be a literal".to_string());
    }
    if !matches!(predicate, Term::Iri(_)) {
        return Err("predicate must be an IRI".to_string());
    }

    Ok(Some(Quad {
        subject,
        predicate,
        object,
        graph,
    }))
}

struct Cursor<'a> {
    rest: &'a str,
}

impl<'a> Cursor<'a> {
    fn skip_ws(&mut self) {
        self.rest = self.rest.trim_start();
    }

    fn term(&mut self) -> std::result::Result<Term, String> {
        self.skip_ws();
        if let Some(rest) = self.rest.strip_prefix('<') {
            let end = rest.find('>').ok_or("unterminated IRI")?;
            self.rest = &rest[end + 1..];
            Ok(Term::Iri(rest[..end].to_string()))
        } else if let Some(rest) = self.rest.strip_prefix("_:") {
            let end = rest
                .find(|c: char| c.is_whitespace())
                .unwrap_or(rest.len());
            self.rest = &rest[end..];
            Ok(Term::Blank(rest[..end].to_string()))
        } else if self.rest.starts_with('"') {
            self.literal()
        } else {
            Err(format!("unexpected token: {}", self.rest))
        }
    }

    fn literal(&mut self) -> std::result::Result<Term, String> {
        let mut lexical = String::new();
        let mut chars = self.rest.char_indices().skip(1);
        let mut end = None;

        while let Some((i, c)) = chars.next() {
            match c {
                '"' => {
                    end = Some(i);
                    break;
                }
                '\\' => match chars.next() {
                    Some((_, 'n')) => lexical.push('\n'),
                    Some((_, 't')) => lexical.push('\t'),
                    Some((_, 'r')) => lexical.push('\r'),
                    Some((_, 'b')) => lexical.push('\u{8}'),
                    Some((_, 'f')) => lexical.push('\u{c}'),
                    Some((_, 'u')) => lexical.push(unicode_escape(&mut chars, 4)?),
                    Some((_, 'U')) => lexical.push(unicode_escape(&mut chars, 8)?),
                    Some((_, other)) => lexical.push(other),
                    None => return Err("dangling escape in literal".to_string()),
                },
                _ => lexical.push(c),
            }
        }

        let end = end.ok_or("unterminated literal")?;
        self.rest = &self.rest[end + 1..];

        let mut datatype = None;
        let mut lang = None;
        if let Some(rest) = self.rest.strip_prefix("^^") {
            self.rest = rest;
            match self.term()? {
                Term::Iri(iri) => datatype = Some(iri),
                _ => return Err("literal datatype must be an IRI".to_string()),
            }
        } else if let Some(rest) = self.rest.strip_prefix('@') {
            let end = rest
                .find(|c: char| c.is_whitespace())
                .unwrap_or(rest.len());
            lang = Some(rest[..end].to_string());
            self.rest = &rest[end..];
        }

        Ok(Term::Literal {
            lexical,
            datatype,
            lang,
        })
    }
}

/// Decode the hex digits of a `\uXXXX` or `\UXXXXXXXX` escape.
fn unicode_escape<I>(chars: &mut I, digits: usize) -> std::result::Result<char, String>
where
    I: Iterator<Item = (usize, char)>,
{
    let hex: String = chars.take(digits).map(|(_, c)| c).collect();
    if hex.chars().count() != digits || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(format!("malformed unicode escape in literal: {hex}"));
    }
    u32::from_str_radix(&hex, 16)
        .ok()
        .and_then(char::from_u32)
        .ok_or_else(|| format!("unicode escape is not a character: {hex}"))
}
