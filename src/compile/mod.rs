//! The compiler orchestrator.
//!
//! [`Compiler::compile`] drives each requested file through the stage
//! pipeline (source → AST → descriptor proto → linked descriptor), resolving
//! imports recursively. Every logical path gets exactly one task, shared by
//! all files that import it; tasks are dispatched to a fixed pool of worker
//! threads, and a task waiting on its dependencies is re-enqueued by the last
//! dependency to finish rather than pinning a worker.


use std::{
    collections::{HashMap, HashSet},
    fmt,
    io::Read,
    panic::{self, AssertUnwindSafe},
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{Receiver, Sender},
        Arc, Condvar, Mutex, MutexGuard, PoisonError,
    },
    thread,
};

use prost_reflect::FileDescriptor;
use prost_types::FileDescriptorProto;

use crate::{
    ast::FileNode,
    error::ErrorKind,
    link, lower, parse,
    reporter::{CollectReporter, Handler, Reporter},
    resolve::{Resolver, SearchResult},
    Error,
};

/// A token for cooperatively canceling a [`compile`](Compiler::compile) call
/// from another thread.
///
/// Workers check the token before each stage; canceled tasks store a
/// [`Canceled`](Error::is_canceled) result instead of compiling further.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    canceled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Creates a new, uncanceled token.
    pub fn new() -> Self {
        Default::default()
    }

    /// Requests cancellation. In-flight work is not forcibly aborted.
    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
    }

    /// Returns `true` if [`cancel`](CancellationToken::cancel) has been
    /// called.
    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }
}

/// Compiles protobuf source files into linked descriptors.
pub struct Compiler {
    resolver: Arc<dyn Resolver>,
    reporter: Arc<dyn Reporter>,
    max_parallelism: usize,
    include_source_info: bool,
    retain_asts: bool,
    max_import_depth: Option<usize>,
    asts: HashMap<String, FileNode>,
}

impl Compiler {
    /// Creates a new `Compiler` which locates files through the given
    /// resolver.
    pub fn new<R>(resolver: R) -> Self
    where
        R: Resolver + 'static,
    {
        Compiler {
            resolver: Arc::new(resolver),
            reporter: Arc::new(CollectReporter::new()),
            max_parallelism: thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            include_source_info: false,
            retain_asts: false,
            max_import_depth: None,
            asts: HashMap::new(),
        }
    }

    /// Sets whether compiled descriptors include source locations and
    /// comments. Defaults to `false`.
    pub fn include_source_info(&mut self, yes: bool) -> &mut Self {
        self.include_source_info = yes;
        self
    }

    /// Sets whether parsed syntax trees are kept after compilation, making
    /// them available through [`ast`](Compiler::ast). Defaults to `false`.
    pub fn retain_asts(&mut self, yes: bool) -> &mut Self {
        self.retain_asts = yes;
        self
    }

    /// Sets the maximum number of files compiled concurrently. Defaults to
    /// the number of logical CPUs; values below 1 are clamped to 1.
    pub fn max_parallelism(&mut self, parallelism: usize) -> &mut Self {
        self.max_parallelism = parallelism.max(1);
        self
    }

    /// Limits how deeply imports may nest. Unlimited by default.
    pub fn max_import_depth(&mut self, depth: usize) -> &mut Self {
        self.max_import_depth = Some(depth);
        self
    }

    /// Replaces the diagnostic sink. Defaults to collecting every diagnostic
    /// without aborting.
    pub fn reporter<R>(&mut self, reporter: R) -> &mut Self
    where
        R: Reporter + 'static,
    {
        self.reporter = Arc::new(reporter);
        self
    }

    /// Returns the syntax tree retained for a previously compiled file.
    ///
    /// Only available after a [`compile`](Compiler::compile) call with
    /// [`retain_asts`](Compiler::retain_asts) enabled.
    pub fn ast(&self, path: &str) -> Option<&FileNode> {
        self.asts.get(path)
    }

    /// Compiles the given files and every file they transitively import,
    /// returning linked descriptors in the same order as the input paths.
    ///
    /// Each logical path is compiled at most once per call, no matter how
    /// many times it is requested or imported. The first failing input's
    /// error is returned; a failure in a dependency propagates to every file
    /// that imports it.
    pub fn compile<I, P>(
        &mut self,
        cancel: &CancellationToken,
        paths: I,
    ) -> Result<Vec<FileDescriptor>, Error>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<str>,
    {
        let seeds: Vec<String> = paths
            .into_iter()
            .map(|path| path.as_ref().to_owned())
            .collect();

        let (sender, receiver) = std::sync::mpsc::channel();
        let shared = Shared {
            resolver: self.resolver.clone(),
            reporter: self.reporter.clone(),
            include_source_info: self.include_source_info,
            retain_asts: self.retain_asts,
            max_import_depth: self.max_import_depth,
            cancel: cancel.clone(),
            jobs: Mutex::new(Some(sender)),
            receiver: Mutex::new(receiver),
            state: Mutex::new(State {
                tasks: HashMap::new(),
            }),
            done: Condvar::new(),
        };

        thread::scope(|scope| {
            for n in 0..self.max_parallelism {
                thread::Builder::new()
                    .name(format!("protoforge-worker-{}", n))
                    .spawn_scoped(scope, || shared.run_worker())
                    .expect("failed to spawn worker thread");
            }

            for seed in &seeds {
                if let Err(err) = shared.ensure_task(seed, &[]) {
                    shared.complete(seed, Err(err));
                }
            }

            let mut state = shared.state();
            while seeds
                .iter()
                .any(|seed| state.tasks[seed.as_str()].result.is_none())
            {
                state = shared
                    .done
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            drop(state);

            // Closing the channel lets the workers drain outstanding jobs
            // for import tasks and exit.
            *shared.jobs.lock().unwrap_or_else(PoisonError::into_inner) = None;
        });

        let mut state = shared.state();
        if self.retain_asts {
            for (path, task) in state.tasks.iter_mut() {
                if let Some(ast) = task.ast.take() {
                    self.asts.insert(path.clone(), ast);
                }
            }
        }

        let mut descriptors = Vec::with_capacity(seeds.len());
        for seed in &seeds {
            let result = state.tasks[seed.as_str()]
                .result
                .clone()
                .expect("every requested file has a result");
            descriptors.push(result?);
        }

        Ok(descriptors)
    }
}

impl fmt::Debug for Compiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Compiler")
            .field("max_parallelism", &self.max_parallelism)
            .field("include_source_info", &self.include_source_info)
            .field("retain_asts", &self.retain_asts)
            .field("max_import_depth", &self.max_import_depth)
            .finish_non_exhaustive()
    }
}

/// A unit of work dispatched to the pool. Driving resolves a file and
/// advances it as far as its dependencies allow; linking runs once every
/// dependency has completed.
enum Job {
    Drive(String),
    Link(String),
}

impl Job {
    fn path(&self) -> &str {
        match self {
            Job::Drive(path) | Job::Link(path) => path,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Stage {
    Resolving,
    WaitingOnDependencies,
    Done,
}

struct Task {
    stage: Stage,
    /// The chain of imports that created this task, ending with the task's
    /// own path.
    stack: Vec<String>,
    /// Direct dependencies, recorded once the file has been parsed.
    deps: Vec<String>,
    /// Tasks to re-enqueue when this one completes.
    waiters: Vec<String>,
    /// Dependencies that have not completed yet.
    pending: usize,
    /// The lowered descriptor, staged until the dependencies are linked.
    proto: Option<FileDescriptorProto>,
    ast: Option<FileNode>,
    result: Option<Result<FileDescriptor, Error>>,
}

impl Task {
    fn new(stack: Vec<String>) -> Self {
        Task {
            stage: Stage::Resolving,
            stack,
            deps: Vec::new(),
            waiters: Vec::new(),
            pending: 0,
            proto: None,
            ast: None,
            result: None,
        }
    }
}

struct State {
    tasks: HashMap<String, Task>,
}

struct Shared {
    resolver: Arc<dyn Resolver>,
    reporter: Arc<dyn Reporter>,
    include_source_info: bool,
    retain_asts: bool,
    max_import_depth: Option<usize>,
    cancel: CancellationToken,
    jobs: Mutex<Option<Sender<Job>>>,
    receiver: Mutex<Receiver<Job>>,
    state: Mutex<State>,
    done: Condvar,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn submit(&self, job: Job) {
        let jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(sender) = &*jobs {
            let _ = sender.send(job);
        }
    }

    fn run_worker(&self) {
        loop {
            let job = {
                let receiver = self
                    .receiver
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                match receiver.recv() {
                    Ok(job) => job,
                    Err(_) => return,
                }
            };

            let path = job.path().to_owned();
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| match &job {
                Job::Drive(path) => self.drive(path),
                Job::Link(path) => self.link_file(path),
            }));

            // A fault in one task is contained here: it becomes that task's
            // result, and files importing it see an ordinary failure.
            if let Err(payload) = outcome {
                let backtrace = std::backtrace::Backtrace::force_capture();
                let err = Error::panicked(&path, payload.as_ref(), backtrace.to_string());
                self.complete(&path, Err(err));
            }
        }
    }

    /// Creates the task for `path` if it does not exist yet, scheduling a
    /// worker to drive it. `requester_stack` is the import chain of the
    /// requesting task, used for cycle and depth detection.
    fn ensure_task(&self, path: &str, requester_stack: &[String]) -> Result<(), Error> {
        if let Some(position) = requester_stack.iter().position(|name| name == path) {
            let mut cycle: Vec<String> = requester_stack[position..].to_vec();
            cycle.push(path.to_owned());
            return Err(Error::from_kind(ErrorKind::CircularImport { cycle }));
        }

        if let Some(limit) = self.max_import_depth {
            if requester_stack.len() > limit {
                return Err(Error::from_kind(ErrorKind::ImportDepthExceeded {
                    name: path.to_owned(),
                    limit,
                }));
            }
        }

        let mut state = self.state();
        if state.tasks.contains_key(path) {
            return Ok(());
        }

        let mut stack = requester_stack.to_vec();
        stack.push(path.to_owned());
        state.tasks.insert(path.to_owned(), Task::new(stack));
        drop(state);

        self.submit(Job::Drive(path.to_owned()));
        Ok(())
    }

    /// Advances a file from whatever stage its search result supplies until
    /// it is either linked or waiting on dependencies.
    fn drive(&self, path: &str) {
        if self.cancel.is_canceled() {
            return self.complete(path, Err(Error::from_kind(ErrorKind::Canceled)));
        }

        let found = match self.resolver.find_file_by_path(path) {
            Ok(found) => found,
            Err(err) => return self.complete(path, Err(err)),
        };

        let (proto, ast) = match self.advance(path, found) {
            Ok(Advanced::Linked(desc)) => return self.complete(path, Ok(desc)),
            Ok(Advanced::Lowered { proto, ast }) => (proto, ast),
            Err(err) => return self.complete(path, Err(err)),
        };

        match self.register_dependencies(path, proto, ast) {
            Ok(true) => self.link_file(path),
            Ok(false) => {}
            Err(err) => self.complete(path, Err(err)),
        }
    }

    /// Lifts a search result up the stage ladder as far as parsing and
    /// lowering go. Linking is deferred until the dependencies are known to
    /// be complete.
    fn advance(&self, path: &str, found: SearchResult) -> Result<Advanced, Error> {
        let (ast, proto) = match found {
            SearchResult::Desc(desc) => return Ok(Advanced::Linked(desc)),
            SearchResult::Proto(proto) => (None, proto),
            SearchResult::Ast(ast) => {
                let proto = self.lower(&ast)?;
                (Some(ast), proto)
            }
            SearchResult::Source(mut reader) => {
                let mut source = String::new();
                if let Err(err) = reader.read_to_string(&mut source) {
                    return Err(Error::open_file(PathBuf::from(path), err));
                }

                if self.cancel.is_canceled() {
                    return Err(Error::from_kind(ErrorKind::Canceled));
                }

                let handler = Handler::new(self.reporter.clone());
                let ast = parse::parse(path, &source, &handler)?;
                let proto = self.lower(&ast)?;
                (Some(ast), proto)
            }
        };

        Ok(Advanced::Lowered { proto, ast })
    }

    fn lower(&self, ast: &FileNode) -> Result<FileDescriptorProto, Error> {
        if self.cancel.is_canceled() {
            return Err(Error::from_kind(ErrorKind::Canceled));
        }
        let handler = Handler::new(self.reporter.clone());
        Ok(lower::lower(ast, &handler, self.include_source_info)?)
    }

    /// Creates tasks for the file's direct dependencies and subscribes to
    /// their completion. Returns `Ok(true)` when every dependency has
    /// already completed and the file can be linked immediately.
    fn register_dependencies(
        &self,
        path: &str,
        proto: FileDescriptorProto,
        ast: Option<FileNode>,
    ) -> Result<bool, Error> {
        let stack = {
            let state = self.state();
            state.tasks[path].stack.clone()
        };

        let mut deps: Vec<String> = Vec::new();
        for dep in &proto.dependency {
            if !deps.iter().any(|existing| existing == dep) {
                deps.push(dep.clone());
            }
        }

        for dep in &deps {
            self.ensure_task(dep, &stack)?;
        }

        let mut state = self.state();

        // The ancestor-stack check above cannot see a cycle assembled from
        // several seed files, so also refuse edges that would make this file
        // reachable from one of its own dependencies.
        for dep in &deps {
            if state.tasks[dep.as_str()].result.is_none() {
                if let Some(chain) = reachable(&state, dep, path) {
                    let mut cycle = vec![path.to_owned()];
                    cycle.extend(chain);
                    return Err(Error::from_kind(ErrorKind::CircularImport { cycle }));
                }
            }
        }

        let mut pending = 0;
        for dep in &deps {
            let task = state.tasks.get_mut(dep.as_str()).expect("task was created");
            if task.result.is_none() {
                task.waiters.push(path.to_owned());
                pending += 1;
            }
        }

        let task = state.tasks.get_mut(path).expect("task exists");
        task.deps = deps;
        task.pending = pending;
        task.proto = Some(proto);
        if self.retain_asts {
            task.ast = ast;
        }
        task.stage = Stage::WaitingOnDependencies;

        Ok(pending == 0)
    }

    /// Links a file whose dependencies have all completed. A failed
    /// dependency propagates as this file's result without invoking the
    /// linker.
    fn link_file(&self, path: &str) {
        if self.cancel.is_canceled() {
            return self.complete(path, Err(Error::from_kind(ErrorKind::Canceled)));
        }

        let (proto, dependencies) = {
            let mut state = self.state();
            debug_assert_eq!(state.tasks[path].stage, Stage::WaitingOnDependencies);

            let deps = state.tasks[path].deps.clone();
            let mut descriptors = Vec::with_capacity(deps.len());
            for dep in &deps {
                match &state.tasks[dep.as_str()].result {
                    Some(Ok(desc)) => descriptors.push(desc.clone()),
                    Some(Err(err)) => {
                        let err = err.clone();
                        drop(state);
                        return self.complete(path, Err(err));
                    }
                    None => unreachable!("linked before dependency '{}' completed", dep),
                }
            }

            let task = state.tasks.get_mut(path).expect("task exists");
            let proto = task.proto.take().expect("file was lowered before linking");
            (proto, descriptors)
        };

        let result = link::link(proto, &dependencies);
        self.complete(path, result);
    }

    /// Stores a task's result, wakes its waiters and re-enqueues any that
    /// became ready. The first result wins; later ones are dropped.
    fn complete(&self, path: &str, result: Result<FileDescriptor, Error>) {
        let ready = {
            let mut state = self.state();

            let task = state
                .tasks
                .entry(path.to_owned())
                .or_insert_with(|| Task::new(vec![path.to_owned()]));
            if task.result.is_some() {
                return;
            }
            task.result = Some(result);
            task.stage = Stage::Done;
            let waiters = std::mem::take(&mut task.waiters);

            let mut ready = Vec::new();
            for waiter in waiters {
                let task = state
                    .tasks
                    .get_mut(&waiter)
                    .expect("waiting task exists");
                task.pending -= 1;
                if task.pending == 0 {
                    ready.push(waiter);
                }
            }
            ready
        };

        for waiter in ready {
            self.submit(Job::Link(waiter));
        }
        self.done.notify_all();
    }
}

enum Advanced {
    Linked(FileDescriptor),
    Lowered {
        proto: FileDescriptorProto,
        ast: Option<FileNode>,
    },
}

/// Searches the in-progress dependency edges for a path from `from` to
/// `target`, returning the chain of files (starting at `from`, ending at
/// `target`) if one exists.
fn reachable(state: &State, from: &str, target: &str) -> Option<Vec<String>> {
    fn visit(
        state: &State,
        current: &str,
        target: &str,
        visited: &mut HashSet<String>,
        chain: &mut Vec<String>,
    ) -> bool {
        if current == target {
            return true;
        }
        let task = match state.tasks.get(current) {
            Some(task) => task,
            None => return false,
        };
        if task.result.is_some() {
            return false;
        }
        for dep in &task.deps {
            if visited.insert(dep.clone()) {
                chain.push(dep.clone());
                if visit(state, dep, target, visited, chain) {
                    return true;
                }
                chain.pop();
            }
        }
        false
    }

    let mut visited = HashSet::new();
    let mut chain = vec![from.to_owned()];
    if visit(state, from, target, &mut visited, &mut chain) {
        Some(chain)
    } else {
        None
    }
}
