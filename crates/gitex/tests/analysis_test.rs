//! Integration tests for project analysis

use std::fs;
use std::path::{Path, PathBuf};

use gitex::config::{self, AnalyzerConfig};
use gitex::extraction::{analyze, scan_directory};
use gitex::namespace::ProjectModules;
use gitex::types::{DiagnosticKind, InheritanceEdge, ParseStatus};
use tempfile::TempDir;

fn write_file(root: &Path, rel: &str, content: &str) -> PathBuf {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    path
}

fn setup_zoo_project() -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    write_file(
        root,
        "animals.py",
        "class Animal:\n    def speak(self):\n        return None\n",
    );
    write_file(
        root,
        "zoo.py",
        "import os\nfrom animals import Animal\n\nclass Dog(Animal):\n    def speak(self):\n        return self.bark()\n\n    def bark(self):\n        return os.getcwd()\n",
    );
    temp_dir
}

#[test]
fn test_namespace_registers_packages_not_classes() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    let files = vec![
        write_file(root, "pkg/__init__.py", ""),
        write_file(root, "pkg/mod.py", "class Foo:\n    pass\n"),
    ];

    let modules = ProjectModules::build(root, &files, &AnalyzerConfig::default());
    assert!(modules.contains("pkg"));
    assert!(modules.contains("pkg.mod"));
    assert!(!modules.contains("pkg.mod.Foo"));
    assert_eq!(modules.len(), 2);
}

#[test]
fn test_inheritance_across_files() {
    let temp_dir = setup_zoo_project();
    let root = temp_dir.path();
    let config = AnalyzerConfig::default();
    let files = scan_directory(root, &config);

    let analysis = analyze(root, &files, &config).unwrap();

    assert_eq!(analysis.classes.len(), 2);
    assert!(analysis.inheritance_edges.contains(&InheritanceEdge {
        base: "animals.py::Animal".to_string(),
        derived: "zoo.py::Dog".to_string(),
        token: "Animal".to_string(),
    }));
    assert_eq!(analysis.inheritance_edges.len(), 1);
}

#[test]
fn test_self_call_resolves_within_class() {
    let temp_dir = setup_zoo_project();
    let root = temp_dir.path();
    let config = AnalyzerConfig::default();
    let files = scan_directory(root, &config);

    let analysis = analyze(root, &files, &config).unwrap();

    let graph = analysis.call_graph();
    let callees = graph.get("zoo.py::Dog.speak").unwrap();
    assert!(callees.contains("zoo.py::Dog.bark"));

    let bark = analysis.function("zoo.py::Dog.bark").unwrap();
    assert_eq!(bark.called_by, vec!["zoo.py::Dog.speak".to_string()]);
}

#[test]
fn test_import_classification_matches_namespace() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    write_file(root, "pkg/__init__.py", "");
    write_file(root, "pkg/models.py", "class User:\n    pass\n");
    write_file(
        root,
        "app.py",
        "import os\nimport pkg.models\nimport pkg.missing\nfrom pkg import models\nfrom requests import get\n",
    );

    let config = AnalyzerConfig::default();
    let files = scan_directory(root, &config);
    let modules = ProjectModules::build(root, &files, &config);
    let analysis = analyze(root, &files, &config).unwrap();

    let imports = &analysis.imports["app.py"];
    assert_eq!(imports.len(), 5);
    for import in imports {
        assert_eq!(import.is_external, !modules.contains(&import.module));
    }

    let internal: Vec<&str> = imports
        .iter()
        .filter(|import| !import.is_external)
        .map(|import| import.module.as_str())
        .collect();
    assert_eq!(internal, vec!["pkg.models", "pkg"]);

    let deps = &analysis.file_dependencies["app.py"];
    assert!(deps.contains("pkg"));
    assert!(deps.contains("pkg.models"));
    assert!(!deps.contains("pkg.missing"));

    let external: Vec<&str> = analysis.external_packages().into_iter().collect();
    assert_eq!(external, vec!["os", "pkg", "requests"]);
}

#[test]
fn test_broken_files_become_diagnostics() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    write_file(root, "good.py", "def ok():\n    return 1\n");
    write_file(root, "broken.py", "def broken(:\n    pass\n");
    let latin = root.join("latin.py");
    fs::write(&latin, [b'x', b' ', b'=', b' ', b'"', 0xe9, b'"', b'\n']).unwrap();

    let config = AnalyzerConfig::default();
    let files = scan_directory(root, &config);
    assert_eq!(files.len(), 3);

    let analysis = analyze(root, &files, &config).unwrap();

    assert_eq!(analysis.files.len(), 3);
    assert_eq!(analysis.parsed_file_count(), 1);
    assert_eq!(analysis.file("broken.py").unwrap().status, ParseStatus::Unparsable);
    assert_eq!(analysis.file("latin.py").unwrap().status, ParseStatus::Unreadable);

    let kinds: Vec<(DiagnosticKind, &str)> = analysis
        .diagnostics
        .iter()
        .map(|diag| (diag.kind, diag.path.as_str()))
        .collect();
    assert!(kinds.contains(&(DiagnosticKind::FileUnparsable, "broken.py")));
    assert!(kinds.contains(&(DiagnosticKind::FileUnreadable, "latin.py")));

    assert_eq!(analysis.functions.len(), 1);
    assert_eq!(analysis.functions[0].key, "good.py::ok");
    assert!(!analysis.imports.contains_key("broken.py"));
}

#[test]
fn test_parallel_and_serial_agree() {
    let temp_dir = setup_zoo_project();
    let root = temp_dir.path();
    write_file(root, "helpers.py", "def util():\n    return 1\n\ndef other():\n    return util()\n");
    write_file(root, "more.py", "def util():\n    return 2\n\ndef main():\n    return util()\n");

    let parallel = AnalyzerConfig::default();
    let serial = AnalyzerConfig {
        parallel: false,
        ..AnalyzerConfig::default()
    };
    let files = scan_directory(root, &parallel);

    let first = analyze(root, &files, &parallel).unwrap();
    let second = analyze(root, &files, &serial).unwrap();
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

#[test]
fn test_input_order_does_not_matter() {
    let temp_dir = setup_zoo_project();
    let root = temp_dir.path();
    let config = AnalyzerConfig::default();
    let files = scan_directory(root, &config);
    let mut reversed = files.clone();
    reversed.reverse();

    let first = analyze(root, &files, &config).unwrap();
    let second = analyze(root, &reversed, &config).unwrap();
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

#[test]
fn test_scan_skips_excluded_directories() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    write_file(root, "main.py", "");
    write_file(root, "src/lib.py", "");
    write_file(root, ".venv/lib/site.py", "");
    write_file(root, "__pycache__/main.py", "");
    write_file(root, "notes.txt", "");

    let files = scan_directory(root, &AnalyzerConfig::default());
    let rel: Vec<PathBuf> = files
        .iter()
        .map(|file| file.strip_prefix(root).unwrap().to_path_buf())
        .collect();
    assert_eq!(rel, vec![PathBuf::from("main.py"), PathBuf::from("src/lib.py")]);
}

#[test]
fn test_extra_exclude_patterns_skip_directories() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    write_file(root, "main.py", "");
    write_file(root, "generated/stubs.py", "");
    write_file(root, "build/steps.py", "");

    let mut config = AnalyzerConfig::default();
    assert_eq!(scan_directory(root, &config).len(), 3);

    config::add_exclude_patterns(&mut config, &["**/generated/**".to_string()]);
    let rel: Vec<PathBuf> = scan_directory(root, &config)
        .iter()
        .map(|file| file.strip_prefix(root).unwrap().to_path_buf())
        .collect();
    assert_eq!(rel, vec![PathBuf::from("build/steps.py"), PathBuf::from("main.py")]);
}

#[test]
fn test_relative_root_analyzes_every_file() {
    let temp_dir = tempfile::Builder::new()
        .prefix("gitex-relative-")
        .tempdir_in(".")
        .unwrap();
    write_file(temp_dir.path(), "pkg/__init__.py", "");
    write_file(temp_dir.path(), "pkg/a.py", "def f():\n    return g()\n\ndef g():\n    return 1\n");
    let root = PathBuf::from(temp_dir.path().file_name().unwrap());
    assert!(root.is_relative());

    let config = AnalyzerConfig::default();
    let files = scan_directory(&root, &config);
    assert_eq!(files.len(), 2);
    let analysis = analyze(&root, &files, &config).unwrap();

    assert!(analysis.diagnostics.is_empty());
    assert_eq!(analysis.parsed_file_count(), 2);
    let file = analysis.file("pkg/a.py").unwrap();
    assert_eq!(file.module, "pkg.a");
    assert!(file.absolute_path.is_absolute());
    assert!(file.absolute_path.is_file());
    assert_eq!(analysis.call_edges.len(), 1);
}

#[test]
fn test_files_outside_root_are_ignored() {
    let project = TempDir::new().unwrap();
    let elsewhere = TempDir::new().unwrap();
    let inside = write_file(project.path(), "inside.py", "def f():\n    pass\n");
    let outside = write_file(elsewhere.path(), "outside.py", "def g():\n    pass\n");

    let analysis = analyze(
        project.path(),
        &[inside, outside],
        &AnalyzerConfig::default(),
    )
    .unwrap();
    assert_eq!(analysis.files.len(), 1);
    assert_eq!(analysis.files[0].path, "inside.py");
}
