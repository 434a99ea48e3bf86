//! Test fixtures for common resolution scenarios.
//!
//! `CandidateFixture` builds `ModCandidate`s with sensible defaults; the
//! scenario functions return ready-made candidate sets and documents.

use crate::core::{DependencyOnly, ModCandidate, ModDependency, ModIdentifier, ModVersion, ProvidedMod, VersionRange};

/// Builder for a candidate descriptor.
///
/// The origin defaults to `mods/{id}-{version}.jar`.
#[derive(Debug, Clone)]
pub struct CandidateFixture {
    id: String,
    version: String,
    origin: Option<String>,
    group: Option<String>,
    name: Option<String>,
    issues: Option<String>,
    mandatory: bool,
    provides: Vec<ProvidedMod>,
    depends: Vec<ModDependency>,
    breaks: Vec<ModDependency>,
}

impl CandidateFixture {
    pub fn new(id: impl Into<String>, version: impl Into<String>) -> Self {
        CandidateFixture {
            id: id.into(),
            version: version.into(),
            origin: None,
            group: None,
            name: None,
            issues: None,
            mandatory: false,
            provides: Vec::new(),
            depends: Vec::new(),
            breaks: Vec::new(),
        }
    }

    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    pub fn origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn issues(mut self, url: impl Into<String>) -> Self {
        self.issues = Some(url.into());
        self
    }

    pub fn provides(mut self, provided: ProvidedMod) -> Self {
        self.provides.push(provided);
        self
    }

    pub fn depends(mut self, dependency: impl Into<ModDependency>) -> Self {
        self.depends.push(dependency.into());
        self
    }

    pub fn breaks(mut self, conflict: impl Into<ModDependency>) -> Self {
        self.breaks.push(conflict.into());
        self
    }

    pub fn build(self) -> ModCandidate {
        let version = ModVersion::parse(&self.version).expect("fixture version");
        let origin = self
            .origin
            .unwrap_or_else(|| format!("mods/{}-{}.jar", self.id, self.version));

        let mut candidate = ModCandidate::new(self.id, version, origin).mandatory(self.mandatory);
        if let Some(group) = self.group {
            candidate = candidate.with_group(group);
        }
        if let Some(name) = self.name {
            candidate = candidate.with_name(name);
        }
        if let Some(issues) = self.issues {
            candidate = candidate.with_issues(issues);
        }
        for provided in self.provides {
            candidate = candidate.provides(provided);
        }
        for dependency in self.depends {
            candidate = candidate.depends(dependency);
        }
        for conflict in self.breaks {
            candidate = candidate.breaks(conflict);
        }
        candidate
    }
}

/// An Only declaration on `id` within `range`.
pub fn requires(id: &str, range: &str) -> ModDependency {
    ModDependency::Only(
        DependencyOnly::new(ModIdentifier::new(id))
            .with_range(VersionRange::parse(range).expect("fixture range")),
    )
}

/// A mandatory `foo` that needs `lib` in `[2.0,3.0)`, plus the given `lib` versions.
pub fn foo_needs_lib(lib_versions: &[&str]) -> Vec<ModCandidate> {
    let mut candidates = vec![CandidateFixture::new("foo", "1.0")
        .mandatory()
        .depends(requires("lib", "[2.0,3.0)"))
        .build()];
    candidates.extend(
        lib_versions
            .iter()
            .map(|version| CandidateFixture::new("lib", *version).build()),
    );
    candidates
}

/// Two mandatory mods claiming `foo`, one directly and one through an alias.
pub fn duplicate_through_alias() -> Vec<ModCandidate> {
    vec![
        CandidateFixture::new("foo", "1.0").mandatory().build(),
        CandidateFixture::new("bundle", "2.0")
            .mandatory()
            .provides(ProvidedMod::new("foo"))
            .build(),
    ]
}

/// A small candidate document exercising every declaration shape.
pub fn sample_document() -> &'static str {
    r#"[[mod]]
id = "foo"
name = "Foo"
version = "1.2.0"
mandatory = true
origin = "mods/foo.jar"
provides = ["foo-api"]

[[mod.depends]]
id = "lib"
versions = "[2.0,3.0)"
reason = "needs the new API"

[[mod.depends]]
any = [{ id = "a" }, { id = "b", versions = ">=2" }]

[[mod.breaks]]
all = [{ id = "x" }, { id = "y", versions = "<1.0" }]

[[mod]]
id = "lib"
version = "2.1.0"
origin = "mods/lib.jar"

[[mod]]
id = "b"
version = "2.0"
origin = "mods/b.jar"
"#
}
