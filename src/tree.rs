/// Directory tree built from the flat file list a repository load returns.
///
/// The service reports paths as stored on its side, e.g.
/// `downloaded_repos/demo-main/src/lib.rs`. The first two segments are the
/// staging prefix and are dropped so the tree starts at the repository root.
use std::collections::BTreeMap;

/// Leading segments that belong to the service's staging area
/// (download root + repository directory).
pub const STAGING_PREFIX_SEGMENTS: usize = 2;

/// Directory levels shown expanded by default in the sidebar.
pub const DEFAULT_EXPANDED_DEPTH: usize = 2;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryTree {
    children: BTreeMap<String, Node>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    File,
    Dir(DirectoryTree),
}

/// One visible line of a flattened tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeRow {
    pub depth: usize,
    pub name: String,
    pub is_dir: bool,
    pub expanded: bool,
}

/// Build a tree from scratch. Duplicate paths are no-ops; when one path uses a
/// name as a file and another as a directory, the directory wins.
pub fn build_tree<S: AsRef<str>>(paths: &[S]) -> DirectoryTree {
    let mut root = DirectoryTree::default();
    for path in paths {
        let normalized = path.as_ref().replace('\\', "/");
        let segments: Vec<&str> = normalized.split('/').filter(|s| !s.is_empty()).collect();
        let relevant = if segments.len() > STAGING_PREFIX_SEGMENTS {
            &segments[STAGING_PREFIX_SEGMENTS..]
        } else {
            &segments[..]
        };
        root.insert(relevant);
    }
    root
}

impl DirectoryTree {
    fn insert(&mut self, segments: &[&str]) {
        let Some((last, dirs)) = segments.split_last() else {
            return;
        };
        let mut current = self;
        for seg in dirs {
            let slot = current.children.entry((*seg).to_string()).or_insert(Node::File);
            if *slot == Node::File {
                *slot = Node::Dir(DirectoryTree::default());
            }
            let Node::Dir(next) = slot else {
                return;
            };
            current = next;
        }
        current.children.entry((*last).to_string()).or_insert(Node::File);
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Node> {
        self.children.get(name)
    }

    /// Children in lexicographic order of segment name.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &Node)> {
        self.children.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of files in the whole tree.
    pub fn leaf_count(&self) -> usize {
        self.children
            .values()
            .map(|node| match node {
                Node::File => 1,
                Node::Dir(sub) => sub.leaf_count(),
            })
            .sum()
    }

    /// Depth-first rows for display. Directories shallower than
    /// `expanded_depth` are opened; deeper ones are listed but collapsed.
    pub fn flatten(&self, expanded_depth: usize) -> Vec<TreeRow> {
        let mut rows = Vec::new();
        self.flatten_into(0, expanded_depth, &mut rows);
        rows
    }

    fn flatten_into(&self, depth: usize, expanded_depth: usize, rows: &mut Vec<TreeRow>) {
        for (name, node) in &self.children {
            match node {
                Node::File => rows.push(TreeRow {
                    depth,
                    name: name.clone(),
                    is_dir: false,
                    expanded: false,
                }),
                Node::Dir(sub) => {
                    let expanded = depth < expanded_depth;
                    rows.push(TreeRow {
                        depth,
                        name: name.clone(),
                        is_dir: true,
                        expanded,
                    });
                    if expanded {
                        sub.flatten_into(depth + 1, expanded_depth, rows);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<&'static str> {
        vec![
            "downloaded_repos/demo-main/src/main.rs",
            "downloaded_repos/demo-main/src/lib.rs",
            "downloaded_repos/demo-main/README.md",
            "downloaded_repos\\demo-main\\docs\\guide\\intro.md",
        ]
    }

    #[test]
    fn test_empty_input_gives_empty_tree() {
        let tree = build_tree::<&str>(&[]);
        assert!(tree.is_empty());
        assert_eq!(tree.leaf_count(), 0);
    }

    #[test]
    fn test_strips_staging_prefix_and_normalizes_separators() {
        let tree = build_tree(&sample());
        let names: Vec<&str> = tree.entries().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["README.md", "docs", "src"]);

        let Some(Node::Dir(docs)) = tree.get("docs") else {
            panic!("docs should be a directory");
        };
        let Some(Node::Dir(guide)) = docs.get("guide") else {
            panic!("guide should be a directory");
        };
        assert_eq!(guide.get("intro.md"), Some(&Node::File));
    }

    #[test]
    fn test_one_leaf_per_distinct_path() {
        let tree = build_tree(&sample());
        assert_eq!(tree.leaf_count(), 4);
    }

    #[test]
    fn test_idempotent_on_duplicates() {
        let paths = sample();
        let doubled: Vec<&str> = paths.iter().chain(paths.iter()).copied().collect();
        assert_eq!(build_tree(&paths), build_tree(&doubled));
    }

    #[test]
    fn test_short_paths_are_kept_whole() {
        let tree = build_tree(&["Cargo.toml", "src/main.rs"]);
        assert_eq!(tree.get("Cargo.toml"), Some(&Node::File));
        assert!(matches!(tree.get("src"), Some(Node::Dir(_))));
    }

    #[test]
    fn test_directory_wins_over_file() {
        // file first, directory later
        let tree = build_tree(&["r/x/pkg", "r/x/pkg/mod.rs"]);
        assert!(matches!(tree.get("pkg"), Some(Node::Dir(_))));
        // directory first, file later
        let tree = build_tree(&["r/x/pkg/mod.rs", "r/x/pkg"]);
        assert!(matches!(tree.get("pkg"), Some(Node::Dir(_))));
        assert_eq!(tree.leaf_count(), 1);
    }

    #[test]
    fn test_empty_segments_are_ignored() {
        let tree = build_tree(&["r/x//src/a.rs", "r/x/src/a.rs/"]);
        assert_eq!(tree.leaf_count(), 1);
    }

    #[test]
    fn test_flatten_expands_first_levels_only() {
        let tree = build_tree(&sample());
        let rows = tree.flatten(1);
        let rendered: Vec<(usize, &str, bool)> =
            rows.iter().map(|r| (r.depth, r.name.as_str(), r.expanded)).collect();
        assert_eq!(
            rendered,
            vec![
                (0, "README.md", false),
                (0, "docs", true),
                (1, "guide", false),
                (0, "src", true),
                (1, "lib.rs", false),
                (1, "main.rs", false),
            ]
        );
    }
}
