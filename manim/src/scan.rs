/*
    Scene discovery works on the script's source text. The script is never imported or executed,
    so a broken or slow script cannot take the launcher down with it.

    Imports of sibling modules (`from common import Base`, `import common`) are followed by
    reading `common.py` next to the script, so a scene may descend from a class defined there.
*/
use regex::Regex;
use std::{
    collections::{HashMap, HashSet},
    fs, io,
    path::{Path, PathBuf},
    rc::Rc,
    sync::OnceLock,
};
use thiserror::Error;

/// Root type every renderable scene descends from.
pub const BASE_SCENE: &str = "Scene";

/// Scene types shipped by the renderer. Subclassing any of them makes a class a scene.
pub const LIBRARY_SCENES: [&str; 7] = [
    BASE_SCENE,
    "ThreeDScene",
    "MovingCameraScene",
    "VectorScene",
    "ZoomedScene",
    "SpecialThreeDScene",
    "LinearTransformationScene",
];

/// Abstract or utility scene types that are never offered for rendering.
pub const DENYLIST: [&str; 6] = [
    "ThreeDScene",
    "MovingCameraScene",
    "VectorScene",
    "ZoomedScene",
    "SpecialThreeDScene",
    "LinearTransformationScene",
];

// Blocks whose body still runs at module level.
const GUARD_BLOCKS: [&str; 7] = ["if", "elif", "else", "try", "except", "finally", "with"];
const OPAQUE_BLOCKS: [&str; 5] = ["def", "class", "for", "while", "match"];

// Key of the scanned script in the module graph. Imported modules are keyed by dotted name.
const MAIN: &str = "";

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Unable to read script: {0}")]
    Io(#[from] io::Error),
    #[error("Class header starting at line {line} is never closed")]
    UnterminatedHeader { line: usize },
}

#[derive(Debug, Clone, PartialEq)]
struct ClassDecl {
    name: String,
    /// As written, dotted names included.
    bases: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
enum Import {
    /// `from module import name as alias`
    Name {
        module: String,
        name: String,
        alias: String,
    },
    /// `from module import *`
    Star { module: String },
    /// `import module as alias`
    Module { module: String, alias: String },
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Block {
    Guard,
    Opaque,
}

#[derive(Debug, Default)]
struct Module {
    classes: Vec<ClassDecl>,
    imports: Vec<Import>,
}

impl Module {
    /// Latest definition of `name` at module level.
    fn class(&self, name: &str) -> Option<&ClassDecl> {
        self.classes.iter().rev().find(|class| class.name == name)
    }

    fn binds(&self, name: &str) -> bool {
        self.class(name).is_some()
            || self
                .imports
                .iter()
                .any(|import| matches!(import, Import::Name { alias, .. } if alias == name))
    }

    fn module_alias(&self, alias: &str) -> Option<&str> {
        self.imports.iter().rev().find_map(|import| match import {
            Import::Module { module, alias: a } if a == alias => Some(module.as_str()),
            _ => None,
        })
    }
}

fn header_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)^class\s+([\p{XID_Start}_]\p{XID_Continue}*)\s*(?:\((.*)\))?\s*:")
            .expect("class header pattern is valid")
    })
}

/// Scan a script for scene classes. Any failure is logged and reported as "no scenes".
pub fn scan_file_for_scenes(path: impl AsRef<Path>) -> Vec<String> {
    let path = path.as_ref();
    match scenes_in_script(path) {
        Ok(scenes) => {
            tracing::debug!("Found {} scene(s) in {}", scenes.len(), path.display());
            scenes
        }
        Err(e) => {
            tracing::warn!("Error scanning {} for scenes: {e}", path.display());
            Vec::new()
        }
    }
}

fn scenes_in_script(path: &Path) -> Result<Vec<String>, ScanError> {
    let source = fs::read_to_string(path)?;
    ModuleGraph::new(path.parent().map(Path::to_path_buf)).scenes(&source)
}

/// Scene class names declared at the top level of `source`, in declaration order.
/// Imports cannot be followed since there is no directory to look in.
pub fn scenes_in_source(source: &str) -> Result<Vec<String>, ScanError> {
    ModuleGraph::new(None).scenes(source)
}

// Modules reachable from the script, parsed on first use.
struct ModuleGraph {
    dir: Option<PathBuf>,
    loaded: HashMap<String, Option<Rc<Module>>>,
}

impl ModuleGraph {
    fn new(dir: Option<PathBuf>) -> Self {
        Self {
            dir,
            loaded: HashMap::new(),
        }
    }

    fn scenes(&mut self, source: &str) -> Result<Vec<String>, ScanError> {
        let main = Rc::new(parse_module(source)?);
        self.loaded.insert(MAIN.to_owned(), Some(Rc::clone(&main)));

        // a name bound twice keeps its first position but takes the latest definition
        let mut order: Vec<&str> = Vec::new();
        for class in &main.classes {
            if !order.contains(&class.name.as_str()) {
                order.push(class.name.as_str());
            }
        }

        Ok(order
            .into_iter()
            .filter(|name| {
                *name != BASE_SCENE && !name.starts_with('_') && !DENYLIST.contains(name)
            })
            .filter(|name| self.is_scene(MAIN, name, &mut HashSet::new()))
            .map(str::to_owned)
            .collect())
    }

    fn module(&mut self, key: &str) -> Option<Rc<Module>> {
        if let Some(module) = self.loaded.get(key) {
            return module.clone();
        }
        let module = self.dir.as_ref().and_then(|dir| {
            let path = dir.join(key.replace('.', "/")).with_extension("py");
            if !path.is_file() {
                return None;
            }
            match fs::read_to_string(&path)
                .map_err(ScanError::from)
                .and_then(|source| parse_module(&source))
            {
                Ok(module) => Some(Rc::new(module)),
                Err(e) => {
                    tracing::debug!("Skipping imported module {}: {e}", path.display());
                    None
                }
            }
        });
        self.loaded.insert(key.to_owned(), module.clone());
        module
    }

    // Base names are matched by name, the same way the renderer's own type check would see them.
    fn is_scene(&mut self, key: &str, name: &str, visited: &mut HashSet<(String, String)>) -> bool {
        if name == BASE_SCENE {
            return true;
        }
        if !visited.insert((key.to_owned(), name.to_owned())) {
            return false;
        }
        let Some(module) = self.module(key) else {
            return LIBRARY_SCENES.contains(&name);
        };

        if let Some(class) = module.class(name) {
            return class
                .bases
                .iter()
                .any(|base| self.base_is_scene(&module, key, base, visited));
        }

        for import in module.imports.iter().rev() {
            match import {
                Import::Name {
                    module: from,
                    name: original,
                    alias,
                } if alias == name => {
                    return if self.module(from).is_some() {
                        self.is_scene(from, original, visited)
                    } else {
                        LIBRARY_SCENES.contains(&original.as_str())
                    };
                }
                Import::Star { module: from }
                    if self.module(from).is_some_and(|m| m.binds(name)) =>
                {
                    return self.is_scene(from, name, visited);
                }
                _ => {}
            }
        }

        LIBRARY_SCENES.contains(&name)
    }

    fn base_is_scene(
        &mut self,
        module: &Module,
        key: &str,
        base: &str,
        visited: &mut HashSet<(String, String)>,
    ) -> bool {
        let Some((prefix, last)) = base.rsplit_once('.') else {
            return self.is_scene(key, base, visited);
        };
        match module.module_alias(prefix).map(str::to_owned) {
            Some(target) if self.module(&target).is_some() => self.is_scene(&target, last, visited),
            // `manim.Scene` and other dotted library names resolve by their last segment
            _ => self.is_scene(key, last, visited),
        }
    }
}

fn parse_module(source: &str) -> Result<Module, ScanError> {
    let lines: Vec<&str> = source.lines().collect();
    let mut module = Module::default();
    let mut blocks: Vec<(usize, Block)> = Vec::new();
    let mut string_delim: Option<&'static str> = None;
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        if string_delim.is_some() {
            string_delim = track_strings(line, string_delim);
            i += 1;
            continue;
        }

        let code = strip_comment(line);
        let body = code.trim_start();
        if body.trim().is_empty() {
            i += 1;
            continue;
        }

        let indent = code.len() - body.len();
        while blocks.last().is_some_and(|(at, _)| *at >= indent) {
            blocks.pop();
        }
        let module_level = blocks.iter().all(|(_, block)| *block == Block::Guard);
        let word = block_keyword(body);

        if word == "class" {
            let header = join_lines(&lines, &mut i, body, header_complete)?;
            if module_level {
                if let Some(class) = parse_header(&header) {
                    module.classes.push(class);
                }
            }
            blocks.push((indent, Block::Opaque));
            i += 1;
            continue;
        }

        if word == "from" || word == "import" {
            let statement = join_lines(&lines, &mut i, body, parens_closed)?;
            if module_level {
                module.imports.extend(parse_import(&statement));
            }
            i += 1;
            continue;
        }

        if GUARD_BLOCKS.contains(&word) {
            blocks.push((indent, Block::Guard));
        } else if OPAQUE_BLOCKS.contains(&word) {
            blocks.push((indent, Block::Opaque));
        }

        string_delim = track_strings(line, None);
        i += 1;
    }

    Ok(module)
}

// First word of a statement, looking through `async`.
fn block_keyword(body: &str) -> &str {
    let word = leading_word(body);
    match word {
        "async" => leading_word(body[word.len()..].trim_start()),
        _ => word,
    }
}

fn leading_word(text: &str) -> &str {
    let end = text
        .find(|c: char| !(c.is_alphanumeric() || c == '_'))
        .unwrap_or(text.len());
    &text[..end]
}

// Extend a statement over continuation lines until `complete` accepts it.
fn join_lines(
    lines: &[&str],
    i: &mut usize,
    first: &str,
    complete: fn(&str) -> bool,
) -> Result<String, ScanError> {
    let start = *i;
    let mut statement = first.to_owned();
    while !complete(&statement) {
        *i += 1;
        let Some(next) = lines.get(*i) else {
            return Err(ScanError::UnterminatedHeader { line: start + 1 });
        };
        statement.push(' ');
        statement.push_str(strip_comment(next));
    }
    Ok(statement)
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(idx) => &line[..idx],
        None => line,
    }
}

fn header_complete(header: &str) -> bool {
    let mut depth = 0i32;
    for c in header.chars() {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => depth -= 1,
            ':' if depth <= 0 => return true,
            _ => {}
        }
    }
    false
}

fn parens_closed(statement: &str) -> bool {
    statement.matches('(').count() <= statement.matches(')').count()
        && !statement.trim_end().ends_with('\\')
}

fn parse_header(header: &str) -> Option<ClassDecl> {
    let caps = header_regex().captures(header.trim_start())?;
    let name = caps.get(1)?.as_str().to_owned();
    let bases = caps
        .get(2)
        .map(|list| {
            list.as_str()
                .split(',')
                .map(str::trim)
                // metaclass=..., total=False and friends are not bases
                .filter(|base| !base.is_empty() && !base.contains('='))
                .map(|base| base.split_whitespace().collect::<String>())
                .collect()
        })
        .unwrap_or_default();
    Some(ClassDecl { name, bases })
}

fn parse_import(statement: &str) -> Vec<Import> {
    let statement = statement.replace(['(', ')', '\\'], " ");
    let statement = statement.trim();

    if let Some(rest) = statement.strip_prefix("import") {
        return rest
            .split(',')
            .filter_map(|item| {
                let (module, alias) = split_alias(item)?;
                Some(Import::Module {
                    module: module.trim_start_matches('.').to_owned(),
                    alias: alias.to_owned(),
                })
            })
            .collect();
    }

    let Some((from, names)) = statement
        .strip_prefix("from")
        .and_then(|rest| rest.split_once(" import "))
    else {
        return Vec::new();
    };
    let module = from.trim().trim_start_matches('.');

    names
        .split(',')
        .filter_map(|item| {
            if item.trim() == "*" {
                return (!module.is_empty()).then(|| Import::Star {
                    module: module.to_owned(),
                });
            }
            let (name, alias) = split_alias(item)?;
            // `from . import common` brings in a sibling module, not a name
            Some(if module.is_empty() {
                Import::Module {
                    module: name.to_owned(),
                    alias: alias.to_owned(),
                }
            } else {
                Import::Name {
                    module: module.to_owned(),
                    name: name.to_owned(),
                    alias: alias.to_owned(),
                }
            })
        })
        .collect()
}

fn split_alias(item: &str) -> Option<(&str, &str)> {
    let mut words = item.split_whitespace();
    let name = words.next()?;
    match (words.next(), words.next()) {
        (Some("as"), Some(alias)) => Some((name, alias)),
        _ => Some((name, name)),
    }
}

// Follow triple-quoted strings across lines so class-like text inside docstrings is skipped.
fn track_strings(line: &str, mut delim: Option<&'static str>) -> Option<&'static str> {
    let mut rest = line;
    loop {
        match delim {
            Some(d) => match rest.find(d) {
                Some(idx) => {
                    rest = &rest[idx + d.len()..];
                    delim = None;
                }
                None => return delim,
            },
            None => {
                let double = rest.find("\"\"\"");
                let single = rest.find("'''");
                let (idx, d) = match (double, single) {
                    (Some(a), Some(b)) if b < a => (b, "'''"),
                    (Some(a), _) => (a, "\"\"\""),
                    (None, Some(b)) => (b, "'''"),
                    (None, None) => return None,
                };
                if strip_comment(rest).len() <= idx {
                    return None;
                }
                rest = &rest[idx + d.len()..];
                delim = Some(d);
            }
        }
    }
}

/// Python scripts directly inside `dir`, sorted by file name.
pub fn scan_directory_for_files(dir: impl AsRef<Path>) -> Vec<PathBuf> {
    let dir = dir.as_ref();
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!("Unable to list {}: {e}", dir.display());
            return Vec::new();
        }
    };

    let mut files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "py"))
        .collect();
    files.sort();
    files
}
