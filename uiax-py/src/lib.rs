//! `uiax` -- Thin PyO3 wrappers around `uiax_core`.
//!
//! Queries release the GIL via `py.allow_threads()` and hand back detached
//! snapshots converted to Python dicts.  Selectors cross the boundary as
//! JSON strings in the `SelectorSpec` form:
//!
//! ```python
//! import uiax
//! f = uiax.Finder()
//! f.find('{"and": [{"role": "Button"}, {"name_contains": "save"}]}')
//! ```

use std::sync::Arc;
use std::time::Duration;

use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::{PyBool, PyDict, PyList, PyString};

use uiax_core::tree::{self, ElementSnapshot};
use uiax_core::{CancelToken, Element, Finder, FinderConfig, Selector, SelectorSpec, UiaxError};

// ---------------------------------------------------------------------------
// Error conversion helpers
// ---------------------------------------------------------------------------

fn to_py_err(e: UiaxError) -> PyErr {
    PyRuntimeError::new_err(e.to_string())
}

fn parse_selector(json: &str) -> PyResult<Selector> {
    serde_json::from_str::<SelectorSpec>(json)
        .map(Selector::from)
        .map_err(|e| PyValueError::new_err(format!("invalid selector: {e}")))
}

// ---------------------------------------------------------------------------
// Snapshot -> Python dict conversion
// ---------------------------------------------------------------------------

fn json_to_py<'py>(py: Python<'py>, value: &serde_json::Value) -> PyResult<Bound<'py, PyAny>> {
    use serde_json::Value;
    Ok(match value {
        Value::Null => py.None().into_bound(py),
        Value::Bool(b) => PyBool::new(py, *b).to_owned().into_any(),
        Value::Number(n) => match n.as_i64() {
            Some(i) => i.into_pyobject(py)?.into_any(),
            None => n.as_f64().unwrap_or(f64::NAN).into_pyobject(py)?.into_any(),
        },
        Value::String(s) => PyString::new(py, s).into_any(),
        Value::Array(items) => {
            let list = PyList::empty(py);
            for item in items {
                list.append(json_to_py(py, item)?)?;
            }
            list.into_any()
        }
        Value::Object(map) => {
            let dict = PyDict::new(py);
            for (k, v) in map {
                dict.set_item(k, json_to_py(py, v)?)?;
            }
            dict.into_any()
        }
    })
}

/// Convert an [`ElementSnapshot`] tree into a nested Python dict.
///
/// Iterative, so deep trees do not grow the native stack.
fn snapshot_to_py_dict<'py>(py: Python<'py>, root: &ElementSnapshot) -> PyResult<Bound<'py, PyDict>> {
    let root_list = PyList::empty(py);
    let mut stack: Vec<(&ElementSnapshot, Bound<'py, PyList>)> = vec![(root, root_list.clone())];

    while let Some((snap, parent_list)) = stack.pop() {
        let dict = PyDict::new(py);
        dict.set_item("id", snap.id.to_string())?;
        dict.set_item("role", snap.role.as_str())?;
        dict.set_item("name", &snap.name)?;
        dict.set_item("title", &snap.title)?;
        dict.set_item("value", &snap.value)?;
        dict.set_item("description", &snap.description)?;
        let b = snap.bounds;
        dict.set_item("bounds", (b.x, b.y, b.width, b.height))?;
        dict.set_item("enabled", snap.enabled)?;
        dict.set_item("focused", snap.focused)?;
        dict.set_item("selected", snap.selected)?;
        dict.set_item("pid", snap.pid)?;
        dict.set_item("depth", snap.depth)?;

        let attributes = PyDict::new(py);
        for (k, v) in &snap.attributes {
            attributes.set_item(k, json_to_py(py, v)?)?;
        }
        dict.set_item("attributes", attributes)?;

        let children_list = PyList::empty(py);
        dict.set_item("children", &children_list)?;
        parent_list.append(&dict)?;

        // Reverse push keeps siblings in document order.
        for child in snap.children.iter().rev() {
            stack.push((child, children_list.clone()));
        }
    }

    Ok(root_list.get_item(0)?.downcast_into::<PyDict>()?)
}

fn snapshots_to_py_list<'py>(py: Python<'py>, snaps: &[ElementSnapshot]) -> PyResult<Bound<'py, PyList>> {
    let list = PyList::empty(py);
    for snap in snaps {
        list.append(snapshot_to_py_dict(py, snap)?)?;
    }
    Ok(list)
}

// ---------------------------------------------------------------------------
// Finder
// ---------------------------------------------------------------------------

/// Python handle over a native [`Finder`].
///
/// Unsendable: the Windows backend must stay on the thread that created
/// it.
#[pyclass(name = "Finder", unsendable)]
pub struct PyFinder {
    inner: Finder,
}

impl PyFinder {
    /// `None` means the focused application.
    fn scope(&self, pid: Option<u32>) -> Result<Arc<Element>, UiaxError> {
        match pid {
            Some(pid) => self.inner.application_by_pid(pid),
            None => self.inner.focused_application(),
        }
    }

    fn first_match(&self, selector: &Selector, pid: Option<u32>) -> Result<Arc<Element>, UiaxError> {
        let root = pid.map(|p| self.inner.application_by_pid(p)).transpose()?;
        self.inner.find_in(root.as_ref(), selector, &CancelToken::new())
    }
}

#[pymethods]
impl PyFinder {
    /// Connect to the platform backend.  `config` is an optional JSON
    /// object of `FinderConfig` fields.
    #[new]
    #[pyo3(signature = (config=None))]
    fn new(config: Option<&str>) -> PyResult<Self> {
        let config = match config {
            Some(json) => FinderConfig::from_json(json)
                .map_err(|e| PyValueError::new_err(format!("invalid config: {e}")))?,
            None => FinderConfig::default(),
        };
        let inner = Finder::with_config(config).map_err(to_py_err)?;
        Ok(Self { inner })
    }

    /// Backend identifier, or `None` once closed.
    #[getter]
    fn backend(&self) -> Option<&'static str> {
        self.inner.backend()
    }

    #[getter]
    fn closed(&self) -> bool {
        self.inner.is_closed()
    }

    fn close(&self) -> PyResult<()> {
        self.inner.close().map_err(to_py_err)
    }

    fn __enter__(slf: PyRef<'_, Self>) -> PyRef<'_, Self> {
        slf
    }

    #[pyo3(signature = (*_args))]
    fn __exit__(&self, _args: &Bound<'_, pyo3::types::PyTuple>) -> PyResult<bool> {
        self.close()?;
        Ok(false)
    }

    /// Running applications as a list of dicts (no children).
    fn applications<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyList>> {
        let snaps = py
            .allow_threads(|| {
                let cancel = CancelToken::new();
                self.inner
                    .all_applications()?
                    .iter()
                    .map(|app| tree::snapshot(app, 1, &cancel))
                    .collect::<Result<Vec<_>, _>>()
            })
            .map_err(to_py_err)?;
        snapshots_to_py_list(py, &snaps)
    }

    /// The element with keyboard focus.
    fn focused_element<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyDict>> {
        let snap = py
            .allow_threads(|| {
                let element = self.inner.focused_element()?;
                tree::snapshot(&element, 1, &CancelToken::new())
            })
            .map_err(to_py_err)?;
        snapshot_to_py_dict(py, &snap)
    }

    /// First element matching `selector`, captured `max_depth` levels deep.
    #[pyo3(signature = (selector, pid=None, max_depth=1))]
    fn find<'py>(
        &self,
        py: Python<'py>,
        selector: &str,
        pid: Option<u32>,
        max_depth: usize,
    ) -> PyResult<Bound<'py, PyDict>> {
        let selector = parse_selector(selector)?;
        let snap = py
            .allow_threads(|| {
                let element = self.first_match(&selector, pid)?;
                tree::snapshot(&element, max_depth, &CancelToken::new())
            })
            .map_err(to_py_err)?;
        snapshot_to_py_dict(py, &snap)
    }

    /// Every element matching `selector`.
    #[pyo3(signature = (selector, pid=None, max_depth=1))]
    fn find_all<'py>(
        &self,
        py: Python<'py>,
        selector: &str,
        pid: Option<u32>,
        max_depth: usize,
    ) -> PyResult<Bound<'py, PyList>> {
        let selector = parse_selector(selector)?;
        let snaps = py
            .allow_threads(|| {
                let cancel = CancelToken::new();
                let root = pid.map(|p| self.inner.application_by_pid(p)).transpose()?;
                self.inner
                    .find_all_in(root.as_ref(), &selector, &cancel)?
                    .iter()
                    .map(|e| tree::snapshot(e, max_depth, &cancel))
                    .collect::<Result<Vec<_>, _>>()
            })
            .map_err(to_py_err)?;
        snapshots_to_py_list(py, &snaps)
    }

    /// Poll until `selector` matches or `timeout_ms` elapses.
    #[pyo3(signature = (selector, timeout_ms, pid=None, max_depth=1))]
    fn wait_for<'py>(
        &self,
        py: Python<'py>,
        selector: &str,
        timeout_ms: u64,
        pid: Option<u32>,
        max_depth: usize,
    ) -> PyResult<Bound<'py, PyDict>> {
        let selector = parse_selector(selector)?;
        let snap = py
            .allow_threads(|| {
                let cancel = CancelToken::new();
                let timeout = Duration::from_millis(timeout_ms);
                let element = match pid {
                    Some(pid) => self.inner.wait_for_with(
                        || self.inner.application_by_pid(pid),
                        &selector,
                        timeout,
                        &cancel,
                    )?,
                    None => self.inner.wait_for(&selector, timeout, &cancel)?,
                };
                tree::snapshot(&element, max_depth, &cancel)
            })
            .map_err(to_py_err)?;
        snapshot_to_py_dict(py, &snap)
    }

    /// Perform a named action on the first element matching `selector`.
    #[pyo3(signature = (selector, action, pid=None))]
    fn perform_action(&self, py: Python<'_>, selector: &str, action: &str, pid: Option<u32>) -> PyResult<()> {
        let selector = parse_selector(selector)?;
        py.allow_threads(|| self.first_match(&selector, pid)?.perform_action(action))
            .map_err(to_py_err)
    }

    /// Set the value of the first element matching `selector`.
    #[pyo3(signature = (selector, value, pid=None))]
    fn set_value(&self, py: Python<'_>, selector: &str, value: &str, pid: Option<u32>) -> PyResult<()> {
        let selector = parse_selector(selector)?;
        py.allow_threads(|| self.first_match(&selector, pid)?.set_value(value))
            .map_err(to_py_err)
    }

    /// Box-drawn text rendering of an application (`0` depth = unlimited).
    #[pyo3(signature = (pid=None, max_depth=0))]
    fn print_tree(&self, py: Python<'_>, pid: Option<u32>, max_depth: usize) -> PyResult<String> {
        py.allow_threads(|| {
            let root = self.scope(pid)?;
            tree::print_tree(&root, max_depth, &CancelToken::new())
        })
        .map_err(to_py_err)
    }

    /// Nested dict capture of an application.
    #[pyo3(signature = (pid=None, max_depth=0))]
    fn snapshot<'py>(&self, py: Python<'py>, pid: Option<u32>, max_depth: usize) -> PyResult<Bound<'py, PyDict>> {
        let snap = py
            .allow_threads(|| {
                let root = self.scope(pid)?;
                tree::snapshot(&root, max_depth, &CancelToken::new())
            })
            .map_err(to_py_err)?;
        snapshot_to_py_dict(py, &snap)
    }
}

// ---------------------------------------------------------------------------
// Module registration
// ---------------------------------------------------------------------------

#[pymodule]
fn uiax(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyFinder>()?;

    m.add("__version__", env!("CARGO_PKG_VERSION"))?;
    m.add("__doc__", "Cross-platform UI element discovery over native accessibility APIs.")?;

    Ok(())
}
