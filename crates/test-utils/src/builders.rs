#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use evalflow::config::CONFIG_FILE_NAME;
use evalflow::dag::{DagGraph, StepDef, StepRegistry};
use evalflow::job::{JobSpec, ResourceRequest};
use evalflow::view::RunRequest;
use tempfile::TempDir;

/// Compile a step graph from the given definitions, in order.
pub fn graph_of(steps: Vec<StepDef>) -> DagGraph {
    DagGraph::build(&registry_of(steps)).expect("Failed to build step graph")
}

pub fn registry_of(steps: Vec<StepDef>) -> StepRegistry {
    let mut registry = StepRegistry::new();
    for step in steps {
        registry.register(step).expect("Failed to register step");
    }
    registry
}

/// One `[step.<name>]` table.
#[derive(Debug, Clone)]
pub struct StepToml {
    name: String,
    method: Option<String>,
    needs: Vec<String>,
    task_num: Option<usize>,
    concurrency: Option<usize>,
}

impl StepToml {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            method: None,
            needs: Vec::new(),
            task_num: None,
            concurrency: None,
        }
    }

    pub fn method(mut self, method: &str) -> Self {
        self.method = Some(method.to_string());
        self
    }

    pub fn needs(mut self, step: &str) -> Self {
        self.needs.push(step.to_string());
        self
    }

    pub fn task_num(mut self, n: usize) -> Self {
        self.task_num = Some(n);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.concurrency = Some(n);
        self
    }

    fn render(&self) -> String {
        let mut out = format!("[step.{}]\n", self.name);
        if let Some(method) = &self.method {
            out.push_str(&format!("method = \"{method}\"\n"));
        }
        if !self.needs.is_empty() {
            let needs: Vec<String> = self.needs.iter().map(|n| format!("\"{n}\"")).collect();
            out.push_str(&format!("needs = [{}]\n", needs.join(", ")));
        }
        if let Some(n) = self.task_num {
            out.push_str(&format!("task_num = {n}\n"));
        }
        if let Some(n) = self.concurrency {
            out.push_str(&format!("concurrency = {n}\n"));
        }
        out
    }
}

/// A model workdir in a temp directory with an `evalflow.toml`.
pub struct Workdir {
    dir: TempDir,
}

impl Workdir {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn path_buf(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    /// Write a dataset file relative to the workdir and return its
    /// reference.
    pub fn dataset(&self, rel: &str, contents: &str) -> String {
        let path = self.dir.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create dataset dir");
        }
        fs::write(&path, contents).expect("Failed to write dataset");
        rel.to_string()
    }
}

/// Builder for model workdirs.
pub struct WorkdirBuilder {
    handler: String,
    task_timeout: Option<String>,
    poll_interval: Option<String>,
    steps: Vec<StepToml>,
}

impl WorkdirBuilder {
    pub fn new(handler: &str) -> Self {
        Self {
            handler: handler.to_string(),
            task_timeout: None,
            poll_interval: Some("20ms".to_string()),
            steps: Vec::new(),
        }
    }

    pub fn task_timeout(mut self, value: &str) -> Self {
        self.task_timeout = Some(value.to_string());
        self
    }

    pub fn poll_interval(mut self, value: &str) -> Self {
        self.poll_interval = Some(value.to_string());
        self
    }

    pub fn step(mut self, step: StepToml) -> Self {
        self.steps.push(step);
        self
    }

    pub fn toml(&self) -> String {
        let mut out = format!("[run]\nhandler = \"{}\"\n\n[config]\n", self.handler);
        if let Some(t) = &self.task_timeout {
            out.push_str(&format!("task_timeout = \"{t}\"\n"));
        }
        if let Some(p) = &self.poll_interval {
            out.push_str(&format!("poll_interval = \"{p}\"\n"));
        }
        for step in self.steps.iter() {
            out.push('\n');
            out.push_str(&step.render());
        }
        out
    }

    pub fn build(self) -> Workdir {
        let dir = tempfile::tempdir().expect("Failed to create temp workdir");
        fs::write(dir.path().join(CONFIG_FILE_NAME), self.toml())
            .expect("Failed to write evalflow.toml");
        Workdir { dir }
    }
}

/// Builder for `JobSpec`.
pub struct JobSpecBuilder {
    spec: JobSpec,
}

impl JobSpecBuilder {
    pub fn new(workdir: &Path) -> Self {
        Self {
            spec: JobSpec {
                id: None,
                project: "self".to_string(),
                name: "default".to_string(),
                description: None,
                model_ref: workdir.display().to_string(),
                workdir: workdir.to_path_buf(),
                dataset_refs: vec!["data".to_string()],
                runtime_ref: None,
                resources: ResourceRequest::parse("cpu:1").expect("valid resource spec"),
            },
        }
    }

    pub fn id(mut self, id: &str) -> Self {
        self.spec.id = Some(id.to_string());
        self
    }

    pub fn project(mut self, project: &str) -> Self {
        self.spec.project = project.to_string();
        self
    }

    pub fn name(mut self, name: &str) -> Self {
        self.spec.name = name.to_string();
        self
    }

    pub fn datasets(mut self, datasets: &[&str]) -> Self {
        self.spec.dataset_refs = datasets.iter().map(|d| d.to_string()).collect();
        self
    }

    pub fn build(self) -> JobSpec {
        self.spec
    }
}

/// Builder for `RunRequest`.
pub struct RunRequestBuilder {
    request: RunRequest,
}

impl RunRequestBuilder {
    pub fn new(model: &Path) -> Self {
        Self {
            request: RunRequest {
                project: "self".to_string(),
                model: model.to_path_buf(),
                datasets: Vec::new(),
                runtime: None,
                name: "default".to_string(),
                description: None,
                resource: "cpu:1".to_string(),
                use_docker: false,
                gencmd: false,
                step: None,
                task_index: 0,
                version: None,
            },
        }
    }

    pub fn project(mut self, project: &str) -> Self {
        self.request.project = project.to_string();
        self
    }

    pub fn dataset(mut self, dataset: &str) -> Self {
        self.request.datasets.push(dataset.to_string());
        self
    }

    pub fn resource(mut self, resource: &str) -> Self {
        self.request.resource = resource.to_string();
        self
    }

    pub fn runtime(mut self, runtime: &str) -> Self {
        self.request.runtime = Some(runtime.to_string());
        self
    }

    pub fn use_docker(mut self, gencmd: bool) -> Self {
        self.request.use_docker = true;
        self.request.gencmd = gencmd;
        self
    }

    pub fn single_task(mut self, step: &str, task_index: usize) -> Self {
        self.request.step = Some(step.to_string());
        self.request.task_index = task_index;
        self
    }

    pub fn version(mut self, version: &str) -> Self {
        self.request.version = Some(version.to_string());
        self
    }

    pub fn build(self) -> RunRequest {
        self.request
    }
}
