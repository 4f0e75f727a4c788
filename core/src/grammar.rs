//! Grammar tree for the DDSL command language.
//!
//! Every legal command path is declared once in [`GRAMMAR`], a compact
//! indented block. Two spaces of indentation make a line a child of the
//! line above it. Command lines read `name | description | properties` and
//! argument lines read `- name | description`.
//!
//! After parsing, `drop` is synthesized as a deep copy of `create` and
//! `revoke` as a deep copy of `grant`. The tree is immutable from then on.
//!
//! # Example
//!
//! ```
//! use ddsl_core::{Property, grammar};
//!
//! let g = grammar();
//! let drop = g.root("drop").unwrap();
//! let tables = g.child(drop, "tables").unwrap();
//! assert!(g.node(tables).has(Property::Primary));
//! assert_eq!(g.node(g.root_of(tables)).name, "drop");
//! ```

use std::fmt::Write as _;
use std::sync::LazyLock;

use crate::error::GrammarError;

/// Declarative source of the built-in grammar.
pub const GRAMMAR: &str = r#"
create | Create database objects | root
  database | The database itself | primary
  roles | Database roles | primary
  extensions | Database extensions | primary
  foreign-keys | Foreign keys of every schema | primary
  schemas | Every schema in the source tree | primary
    except | Skip the listed schemas | optional
      - schema-names | Comma-delimited list of schema names
  schema | The listed schemas | primary
    - schema-names | Comma-delimited list of schema names
  tables | Tables of every or of filtered schemas | primary
    in | Only schemas in the list | optional
      - schema-names | Comma-delimited list of schema names
    except | Skip schemas | optional
      in | Schemas in the list
        - schema-names | Comma-delimited list of schema names
  table | The listed tables | primary
    - item-names | Comma-delimited list of schema.table names
  views | Views of every or of filtered schemas | primary
    in | Only schemas in the list | optional
      - schema-names | Comma-delimited list of schema names
    except | Skip schemas | optional
      in | Schemas in the list
        - schema-names | Comma-delimited list of schema names
  view | The listed views | primary
    - item-names | Comma-delimited list of schema.view names
  functions | Functions of every or of filtered schemas | primary
    in | Only schemas in the list | optional
      - schema-names | Comma-delimited list of schema names
    except | Skip schemas | optional
      in | Schemas in the list
        - schema-names | Comma-delimited list of schema names
  function | The listed functions | primary
    - item-names | Comma-delimited list of schema.function names
  procedures | Procedures of every or of filtered schemas | primary
    in | Only schemas in the list | optional
      - schema-names | Comma-delimited list of schema names
    except | Skip schemas | optional
      in | Schemas in the list
        - schema-names | Comma-delimited list of schema names
  procedure | The listed procedures | primary
    - item-names | Comma-delimited list of schema.procedure names
  types | Types of every or of filtered schemas | primary
    in | Only schemas in the list | optional
      - schema-names | Comma-delimited list of schema names
    except | Skip schemas | optional
      in | Schemas in the list
        - schema-names | Comma-delimited list of schema names
  type | The listed types | primary
    - item-names | Comma-delimited list of schema.type names
  indexes | Indexes of tables and views | primary
    on | Target objects
      - item-names | Comma-delimited list of schema.table or schema.view names
  constraints | Constraints of tables | primary
    on | Target tables
      - item-names | Comma-delimited list of schema.table names
  triggers | Triggers of tables | primary
    on | Target tables
      - item-names | Comma-delimited list of schema.table names
grant | Grant privileges | root
  privileges | Object privileges
    on | Target objects
      database | The database itself | primary
      schemas | Every schema in the source tree | primary
        except | Skip the listed schemas | optional
          - schema-names | Comma-delimited list of schema names
      schema | The listed schemas | primary
        - schema-names | Comma-delimited list of schema names
      tables | Tables of every or of filtered schemas | primary
        in | Only schemas in the list | optional
          - schema-names | Comma-delimited list of schema names
        except | Skip schemas | optional
          in | Schemas in the list
            - schema-names | Comma-delimited list of schema names
      table | The listed tables | primary
        - item-names | Comma-delimited list of schema.table names
      views | Views of every or of filtered schemas | primary
        in | Only schemas in the list | optional
          - schema-names | Comma-delimited list of schema names
        except | Skip schemas | optional
          in | Schemas in the list
            - schema-names | Comma-delimited list of schema names
      view | The listed views | primary
        - item-names | Comma-delimited list of schema.view names
      functions | Functions of every or of filtered schemas | primary
        in | Only schemas in the list | optional
          - schema-names | Comma-delimited list of schema names
        except | Skip schemas | optional
          in | Schemas in the list
            - schema-names | Comma-delimited list of schema names
      function | The listed functions | primary
        - item-names | Comma-delimited list of schema.function names
      procedures | Procedures of every or of filtered schemas | primary
        in | Only schemas in the list | optional
          - schema-names | Comma-delimited list of schema names
        except | Skip schemas | optional
          in | Schemas in the list
            - schema-names | Comma-delimited list of schema names
      procedure | The listed procedures | primary
        - item-names | Comma-delimited list of schema.procedure names
      types | Types of every or of filtered schemas | primary
        in | Only schemas in the list | optional
          - schema-names | Comma-delimited list of schema names
        except | Skip schemas | optional
          in | Schemas in the list
            - schema-names | Comma-delimited list of schema names
      type | The listed types | primary
        - item-names | Comma-delimited list of schema.type names
seed | Load seed data | root
  database | Database-wide seeds | primary
    with | Only the listed seeds | optional
      - seed-names | Comma-delimited list of seed names
    without | Skip the listed seeds | optional
      - seed-names | Comma-delimited list of seed names
  schema | Seeds of the listed schemas | primary
    - schema-names | Comma-delimited list of schema names
    with | Only the listed seeds | optional
      - seed-names | Comma-delimited list of seed names
    without | Skip the listed seeds | optional
      - seed-names | Comma-delimited list of seed names
  schemas | Seeds of every schema | primary
    except | Skip the listed schemas | optional
      - schema-names | Comma-delimited list of schema names
  table | Seeds of the listed tables | primary
    - item-names | Comma-delimited list of schema.table names
    with | Only the listed seeds | optional
      - seed-names | Comma-delimited list of seed names
    without | Skip the listed seeds | optional
      - seed-names | Comma-delimited list of seed names
  tables | Table seeds of every or of filtered schemas | primary
    in | Only schemas in the list | optional
      - schema-names | Comma-delimited list of schema names
    except | Skip schemas | optional
      in | Schemas in the list
        - schema-names | Comma-delimited list of schema names
  cmd | Run a shell command | primary, ext-args
    - cmd | Backtick-quoted shell text
  sql | Run SQL | primary, ext-args
    - sql | Backtick-quoted SQL or a source-relative file
sql | Run SQL text or a source file | root, primary, ext-args
  - sql | Backtick-quoted SQL or a source-relative file
list | Show objects of the live database | root, non-exec
  schemas | Schema names | primary
    in | Only schemas in the list | optional
      - schema-names | Comma-delimited list of schema names
    except | Skip schemas | optional
      in | Schemas in the list
        - schema-names | Comma-delimited list of schema names
  foreign-keys | Foreign keys of every schema | primary
    in | Only schemas in the list | optional
      - schema-names | Comma-delimited list of schema names
    except | Skip schemas | optional
      in | Schemas in the list
        - schema-names | Comma-delimited list of schema names
  schema-items | Tables, views, functions, procedures and types | primary
    in | Only schemas in the list | optional
      - schema-names | Comma-delimited list of schema names
    except | Skip schemas | optional
      in | Schemas in the list
        - schema-names | Comma-delimited list of schema names
  tables | Tables | primary
    in | Only schemas in the list | optional
      - schema-names | Comma-delimited list of schema names
    except | Skip schemas | optional
      in | Schemas in the list
        - schema-names | Comma-delimited list of schema names
  views | Views | primary
    in | Only schemas in the list | optional
      - schema-names | Comma-delimited list of schema names
    except | Skip schemas | optional
      in | Schemas in the list
        - schema-names | Comma-delimited list of schema names
  functions | Functions | primary
    in | Only schemas in the list | optional
      - schema-names | Comma-delimited list of schema names
    except | Skip schemas | optional
      in | Schemas in the list
        - schema-names | Comma-delimited list of schema names
  procedures | Procedures | primary
    in | Only schemas in the list | optional
      - schema-names | Comma-delimited list of schema names
    except | Skip schemas | optional
      in | Schemas in the list
        - schema-names | Comma-delimited list of schema names
  types | Types | primary
    in | Only schemas in the list | optional
      - schema-names | Comma-delimited list of schema names
    except | Skip schemas | optional
      in | Schemas in the list
        - schema-names | Comma-delimited list of schema names
begin | Open a transaction | root
  transaction | Optional noise word | optional
commit | Commit the open transaction | root
  transaction | Optional noise word | optional
rollback | Roll back the open transaction | root
  transaction | Optional noise word | optional
"#;

/// Index of a [`CommandDef`] inside its [`Grammar`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// Boolean properties a command node may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Property {
    /// The parent is complete without this child.
    Optional,
    /// Top-level verb.
    Root,
    /// Object kind selecting the path pattern.
    Primary,
    /// Never produces side-effecting instructions.
    NonExec,
    /// Arguments are free-form text rather than name lists.
    ExtArgs,
}

impl Property {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "optional" => Some(Self::Optional),
            "root" => Some(Self::Root),
            "primary" => Some(Self::Primary),
            "non-exec" => Some(Self::NonExec),
            "ext-args" => Some(Self::ExtArgs),
            _ => None,
        }
    }

    fn bit(self) -> u8 {
        match self {
            Self::Optional => 1,
            Self::Root => 1 << 1,
            Self::Primary => 1 << 2,
            Self::NonExec => 1 << 3,
            Self::ExtArgs => 1 << 4,
        }
    }
}

/// Shape of the value an argument slot accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    /// Comma-delimited identifiers (`a,b,c`).
    Names,
    /// Comma-delimited `schema.item` pairs, either part may be `?`.
    QualifiedNames,
    /// Backtick literal or a source-relative file path.
    SqlText,
    /// Backtick literal only.
    ShellText,
}

impl ArgKind {
    fn from_slot(name: &str) -> Option<Self> {
        match name {
            "schema-names" | "seed-names" => Some(Self::Names),
            "item-names" => Some(Self::QualifiedNames),
            "sql" => Some(Self::SqlText),
            "cmd" => Some(Self::ShellText),
            _ => None,
        }
    }
}

/// Free-form argument placeholder owned by a [`CommandDef`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgDef {
    pub name: String,
    pub description: String,
    pub kind: ArgKind,
}

/// One node of the grammar tree.
#[derive(Debug, Clone)]
pub struct CommandDef {
    pub name: String,
    pub description: String,
    pub level: usize,
    pub args: Vec<ArgDef>,
    properties: u8,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl CommandDef {
    /// Returns `true` if the node carries `property`.
    pub fn has(&self, property: Property) -> bool {
        self.properties & property.bit() != 0
    }
}

/// Immutable tree of every legal command path.
#[derive(Debug, Clone)]
pub struct Grammar {
    nodes: Vec<CommandDef>,
    roots: Vec<NodeId>,
}

static BUILTIN: LazyLock<Grammar> = LazyLock::new(Grammar::builtin);

/// Returns the process-wide built-in grammar.
pub fn grammar() -> &'static Grammar {
    &BUILTIN
}

impl Grammar {
    /// Builds the grammar from [`GRAMMAR`].
    ///
    /// # Panics
    ///
    /// Only if the embedded grammar text is malformed, which the unit tests
    /// rule out.
    pub fn builtin() -> Self {
        Self::from_spec(GRAMMAR).expect("built-in grammar is well formed")
    }

    /// Builds a grammar from indented specification text and synthesizes
    /// `drop` from `create` and `revoke` from `grant` when those exist.
    pub fn from_spec(text: &str) -> Result<Self, GrammarError> {
        let mut grammar = Self {
            nodes: Vec::new(),
            roots: Vec::new(),
        };
        let mut stack: Vec<NodeId> = Vec::new();

        for (idx, raw) in text.lines().enumerate() {
            let line = idx + 1;
            if raw.trim().is_empty() {
                continue;
            }
            let indent = raw.len() - raw.trim_start_matches(' ').len();
            if indent % 2 != 0 {
                return Err(GrammarError::new(line, "indentation must be a multiple of two"));
            }
            let level = indent / 2;
            let body = raw.trim();

            if let Some(arg) = body.strip_prefix("- ") {
                // Arguments belong to the node one level up.
                if level == 0 || stack.len() < level {
                    return Err(GrammarError::new(line, "argument without a parent command"));
                }
                let owner = stack[level - 1];
                let mut parts = arg.split('|').map(str::trim);
                let name = parts.next().unwrap_or_default();
                let description = parts.next().unwrap_or_default();
                let kind = ArgKind::from_slot(name).ok_or_else(|| {
                    GrammarError::new(line, format!("unknown argument slot '{name}'"))
                })?;
                grammar.nodes[owner.0].args.push(ArgDef {
                    name: name.to_string(),
                    description: description.to_string(),
                    kind,
                });
                continue;
            }

            if level > stack.len() {
                return Err(GrammarError::new(line, "indentation skips a level"));
            }
            stack.truncate(level);

            let mut parts = body.split('|').map(str::trim);
            let name = parts.next().unwrap_or_default();
            if name.is_empty() {
                return Err(GrammarError::new(line, "missing command name"));
            }
            let description = parts.next().unwrap_or_default();
            let mut properties = 0;
            for prop in parts.next().unwrap_or_default().split(',').map(str::trim) {
                if prop.is_empty() {
                    continue;
                }
                let prop = Property::parse(prop)
                    .ok_or_else(|| GrammarError::new(line, format!("unknown property '{prop}'")))?;
                properties |= prop.bit();
            }

            let parent = stack.last().copied();
            let is_root = properties & Property::Root.bit() != 0;
            if parent.is_none() != is_root {
                return Err(GrammarError::new(
                    line,
                    "only top-level commands may (and must) be root",
                ));
            }

            let id = NodeId(grammar.nodes.len());
            grammar.nodes.push(CommandDef {
                name: name.to_string(),
                description: description.to_string(),
                level,
                args: Vec::new(),
                properties,
                parent,
                children: Vec::new(),
            });
            match parent {
                Some(parent) => grammar.nodes[parent.0].children.push(id),
                None => grammar.roots.push(id),
            }
            stack.push(id);
        }

        grammar.synthesize("drop", "Drop database objects", "create");
        grammar.synthesize("revoke", "Revoke privileges", "grant");
        Ok(grammar)
    }

    /// Looks up a root command by name (case-insensitive).
    pub fn root(&self, name: &str) -> Option<NodeId> {
        self.roots
            .iter()
            .copied()
            .find(|id| self.nodes[id.0].name.eq_ignore_ascii_case(name))
    }

    /// Iterates over root commands in declaration order.
    pub fn roots(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.roots.iter().copied()
    }

    /// Looks up a direct child of `id` by name (case-insensitive).
    pub fn child(&self, id: NodeId, name: &str) -> Option<NodeId> {
        self.children(id)
            .find(|child| self.nodes[child.0].name.eq_ignore_ascii_case(name))
    }

    /// Iterates over the direct children of `id`.
    pub fn children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes[id.0].children.iter().copied()
    }

    pub fn node(&self, id: NodeId) -> &CommandDef {
        &self.nodes[id.0]
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    /// Ascends from `id` to the owning root command.
    pub fn root_of(&self, mut id: NodeId) -> NodeId {
        while let Some(parent) = self.nodes[id.0].parent {
            id = parent;
        }
        id
    }

    /// A node can end a statement when none of its children is required.
    pub fn is_complete(&self, id: NodeId) -> bool {
        self.children(id)
            .all(|child| self.nodes[child.0].has(Property::Optional))
    }

    /// Renders the tree as indented help text.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        for root in self.roots() {
            self.describe_node(root, &mut out);
        }
        out
    }

    fn describe_node(&self, id: NodeId, out: &mut String) {
        let node = &self.nodes[id.0];
        let indent = "  ".repeat(node.level);
        let mut label = node.name.clone();
        if node.has(Property::Optional) {
            label = format!("[{label}]");
        }
        for arg in &node.args {
            label.push_str(&format!(" <{}>", arg.name));
        }
        let _ = writeln!(out, "{indent}{label:<32} {}", node.description);
        for child in self.children(id) {
            self.describe_node(child, out);
        }
    }

    fn synthesize(&mut self, name: &str, description: &str, template: &str) {
        let Some(source) = self.root(template) else {
            return;
        };
        if self.root(name).is_some() {
            return;
        }
        let id = self.clone_subtree(source, None);
        self.nodes[id.0].name = name.to_string();
        self.nodes[id.0].description = description.to_string();
        self.roots.push(id);
    }

    fn clone_subtree(&mut self, source: NodeId, parent: Option<NodeId>) -> NodeId {
        let mut def = self.nodes[source.0].clone();
        def.parent = parent;
        def.children = Vec::new();
        let id = NodeId(self.nodes.len());
        self.nodes.push(def);

        let children = self.nodes[source.0].children.clone();
        for child in children {
            let cloned = self.clone_subtree(child, Some(id));
            self.nodes[id.0].children.push(cloned);
        }
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(grammar: &Grammar, id: NodeId, prefix: &str, out: &mut Vec<String>) {
        let node = grammar.node(id);
        let path = if prefix.is_empty() {
            node.name.clone()
        } else {
            format!("{prefix} {}", node.name)
        };
        out.push(path.clone());
        for child in grammar.children(id) {
            paths(grammar, child, &path, out);
        }
    }

    #[test]
    fn test_builtin_grammar_parses() {
        let g = Grammar::builtin();
        for name in ["create", "drop", "grant", "revoke", "seed", "sql", "list"] {
            assert!(g.root(name).is_some(), "missing root {name}");
        }
    }

    #[test]
    fn test_drop_mirrors_create() {
        let g = Grammar::builtin();
        let mut create = Vec::new();
        let mut drop = Vec::new();
        paths(&g, g.root("create").unwrap(), "", &mut create);
        paths(&g, g.root("drop").unwrap(), "", &mut drop);
        let create: Vec<_> = create.iter().map(|p| p.replacen("create", "drop", 1)).collect();
        assert_eq!(create, drop);
        assert_eq!(g.node(g.root("drop").unwrap()).description, "Drop database objects");
    }

    #[test]
    fn test_revoke_mirrors_grant_with_args() {
        let g = Grammar::builtin();
        let revoke = g.root("revoke").unwrap();
        let on = g.child(g.child(revoke, "privileges").unwrap(), "on").unwrap();
        let table = g.child(on, "table").unwrap();
        assert_eq!(g.node(table).args[0].kind, ArgKind::QualifiedNames);
        assert_eq!(g.root_of(table), revoke);
    }

    #[test]
    fn test_clone_does_not_share_children() {
        let g = Grammar::builtin();
        let create_tables = g.child(g.root("create").unwrap(), "tables").unwrap();
        let drop_tables = g.child(g.root("drop").unwrap(), "tables").unwrap();
        assert_ne!(create_tables, drop_tables);
        assert_eq!(g.parent(drop_tables), g.root("drop"));
    }

    #[test]
    fn test_child_lookup_is_case_insensitive() {
        let g = grammar();
        let create = g.root("CREATE").unwrap();
        assert!(g.child(create, "Tables").is_some());
        assert!(g.child(create, "nonsense").is_none());
    }

    #[test]
    fn test_completeness() {
        let g = grammar();
        let create = g.root("create").unwrap();
        assert!(!g.is_complete(create));
        assert!(g.is_complete(g.child(create, "tables").unwrap()));
        assert!(!g.is_complete(g.child(create, "indexes").unwrap()));
        assert!(g.is_complete(g.root("begin").unwrap()));
    }

    #[test]
    fn test_properties() {
        let g = grammar();
        let list = g.root("list").unwrap();
        assert!(g.node(list).has(Property::NonExec));
        assert!(g.node(list).has(Property::Root));
        let sql = g.root("sql").unwrap();
        assert!(g.node(sql).has(Property::ExtArgs));
        assert!(g.node(sql).has(Property::Primary));
    }

    #[test]
    fn test_rejects_bad_indentation() {
        let err = Grammar::from_spec("a | b | root\n   c | d\n").unwrap_err();
        assert_eq!(err.line, 2);
    }

    #[test]
    fn test_rejects_unknown_property_and_slot() {
        assert!(Grammar::from_spec("a | b | root, shiny\n").is_err());
        assert!(Grammar::from_spec("a | b | root\n  - mystery | x\n").is_err());
    }

    #[test]
    fn test_rejects_nested_root() {
        assert!(Grammar::from_spec("a | b | root\n  c | d | root\n").is_err());
        assert!(Grammar::from_spec("a | b\n").is_err());
    }

    #[test]
    fn test_describe_lists_arguments() {
        let text = grammar().describe();
        assert!(text.contains("table <item-names>"));
        assert!(text.contains("[except]"));
    }
}
