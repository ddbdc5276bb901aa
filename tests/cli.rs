use std::process::Command;

use graphforce::{GraphFile, graph::NodeRecord};

#[test]
fn lays_out_a_random_graph() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("layout.json");

    let status = Command::new(env!("CARGO_BIN_EXE_graphforce"))
        .args([
            "--random-nodes",
            "40",
            "--random-edges",
            "60",
            "--backend",
            "cpu",
            "--frames",
            "20",
            "--output",
            output.to_str().unwrap(),
        ])
        .status()
        .expect("Failed to execute graphforce");

    assert!(status.success(), "graphforce exited with error");

    let layout = GraphFile::read(&output).expect("Failed to read layout");
    assert_eq!(layout.nodes.len(), 40);
    assert_eq!(layout.edges.len(), 60);
    assert!(
        layout.nodes.iter().all(|n| n.x.is_finite() && n.y.is_finite()),
        "Layout contains non-finite positions"
    );
}

#[test]
fn lays_out_a_graph_file_with_a_yaml_config() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("graph.json");
    let config = dir.path().join("layout.yaml");
    let output = dir.path().join("out.json");

    let graph = GraphFile {
        nodes: vec![
            NodeRecord {
                x: -1.0,
                y: 0.0,
                size: 1.0,
            },
            NodeRecord {
                x: 1.0,
                y: 0.0,
                size: 1.0,
            },
        ],
        edges: vec![[0, 1]],
    };
    graph.write(&input).unwrap();
    std::fs::write(&config, "gravitationalConstant: 0.0\ncentralGravity: 0.0\n").unwrap();

    let status = Command::new(env!("CARGO_BIN_EXE_graphforce"))
        .args([
            "--input",
            input.to_str().unwrap(),
            "--config",
            config.to_str().unwrap(),
            "--backend",
            "cpu",
            "--frames",
            "5",
            "--output",
            output.to_str().unwrap(),
        ])
        .status()
        .expect("Failed to execute graphforce");

    assert!(status.success(), "graphforce exited with error");

    let layout = GraphFile::read(&output).unwrap();
    let (a, b) = (layout.nodes[0], layout.nodes[1]);
    assert!(a.x > -1.0 && b.x < 1.0, "Spring should pull the pair together");
    assert!((a.x + b.x).abs() < 1e-4);
}

#[test]
fn rejects_an_invalid_config() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("bad.json");
    std::fs::write(&config, r#"{ "timestep": -1.0 }"#).unwrap();

    let status = Command::new(env!("CARGO_BIN_EXE_graphforce"))
        .args(["--config", config.to_str().unwrap(), "--backend", "cpu"])
        .status()
        .expect("Failed to execute graphforce");

    assert!(!status.success());
}
