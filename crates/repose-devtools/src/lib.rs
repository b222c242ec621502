use std::cell::RefCell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use web_time::Instant;

use repose_reconciler::{
    CommitInfo, HostConfig, InspectedUnit, ReconcileError, Reconciler, RootHandle,
};

/// Running commit statistics, fed from the reconciler's commit observer.
pub struct Hud {
    pub enabled: bool,
    commit_count: u64,
    last_commit_at: Option<Instant>,
    rate_smooth: f32,
    pub last: Option<CommitInfo>,
}

impl Default for Hud {
    fn default() -> Self {
        Self::new()
    }
}

impl Hud {
    pub fn new() -> Self {
        Self {
            enabled: true,
            commit_count: 0,
            last_commit_at: None,
            rate_smooth: 0.0,
            last: None,
        }
    }

    /// Installs a shared HUD as the commit observer of `reconciler`,
    /// replacing any observer set before.
    pub fn install<H: HostConfig>(reconciler: &mut Reconciler<H>) -> Rc<RefCell<Hud>> {
        let hud = Rc::new(RefCell::new(Hud::new()));
        let sink = hud.clone();
        reconciler.set_commit_observer(move |info| sink.borrow_mut().record(info));
        hud
    }

    pub fn toggle(&mut self) {
        self.enabled = !self.enabled;
    }

    pub fn commit_count(&self) -> u64 {
        self.commit_count
    }

    /// Smoothed commits per second.
    pub fn commit_rate(&self) -> f32 {
        self.rate_smooth
    }

    pub fn record(&mut self, info: &CommitInfo) {
        self.record_at(info, Instant::now());
    }

    pub fn record_at(&mut self, info: &CommitInfo, now: Instant) {
        self.commit_count += 1;
        if let Some(prev) = self.last_commit_at.replace(now) {
            let dt = (now - prev).as_secs_f32();
            if dt > 0.0 {
                let rate = 1.0 / dt;
                // simple EMA
                let a = 0.2;
                self.rate_smooth = if self.rate_smooth == 0.0 {
                    rate
                } else {
                    (1.0 - a) * self.rate_smooth + a * rate
                };
            }
        }
        log::trace!(
            "commit #{}: {} host mutations, {} units rendered",
            self.commit_count,
            info.host_mutations,
            info.units_rendered
        );
        self.last = Some(info.clone());
    }

    /// One-line summary, empty while disabled.
    pub fn overlay(&self) -> String {
        if !self.enabled {
            return String::new();
        }
        let mut lines = vec![
            format!("commits: {}", self.commit_count),
            format!("rate: {:.1}/s", self.rate_smooth),
        ];
        if let Some(info) = &self.last {
            let lane = info
                .lane
                .iter_names()
                .map(|(name, _)| name)
                .collect::<Vec<_>>()
                .join("|");
            lines.push(format!("lane: {lane}"));
            lines.push(format!("mutations: {}", info.host_mutations));
            lines.push(format!("units: {}", info.units_rendered));
        }
        lines.join("  |  ")
    }
}

/// Serializable view of one committed unit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnitSnapshot {
    pub depth: usize,
    pub kind: String,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub flags: Vec<String>,
}

impl From<&InspectedUnit> for UnitSnapshot {
    fn from(unit: &InspectedUnit) -> Self {
        Self {
            depth: unit.depth,
            kind: format!("{:?}", unit.tag),
            label: unit.label.clone(),
            key: unit.key.clone(),
            flags: unit
                .flags
                .iter_names()
                .map(|(name, _)| name.to_string())
                .collect(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TreeSnapshot {
    pub units: Vec<UnitSnapshot>,
}

impl TreeSnapshot {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

/// Reads committed trees out of a reconciler.
pub struct Inspector {
    pub hud: Rc<RefCell<Hud>>,
}

impl Inspector {
    /// Attaches a fresh [`Hud`] to `reconciler`.
    pub fn new<H: HostConfig>(reconciler: &mut Reconciler<H>) -> Self {
        Self {
            hud: Hud::install(reconciler),
        }
    }

    pub fn snapshot<H: HostConfig>(
        &self,
        reconciler: &Reconciler<H>,
        root: RootHandle,
    ) -> Result<TreeSnapshot, ReconcileError> {
        let units = reconciler.inspect(root)?;
        Ok(TreeSnapshot {
            units: units.iter().map(UnitSnapshot::from).collect(),
        })
    }

    /// Indented outline of the committed tree, one unit per line.
    pub fn dump<H: HostConfig>(
        &self,
        reconciler: &Reconciler<H>,
        root: RootHandle,
    ) -> Result<String, ReconcileError> {
        Ok(render_outline(&reconciler.inspect(root)?))
    }
}

pub fn render_outline(units: &[InspectedUnit]) -> String {
    units
        .iter()
        .map(|u| {
            let mut line = format!("{}{}", "  ".repeat(u.depth), u.label);
            if let Some(key) = &u.key {
                line.push_str(&format!(" key={key}"));
            }
            if !u.flags.is_empty() {
                line.push_str(&format!(" {:?}", u.flags));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use repose_noop::NoopHost;
    use repose_reconciler::{Flags, Lanes, ReconcilerConfig, WorkTag, h};

    fn info(mutations: usize) -> CommitInfo {
        CommitInfo {
            root: test_root(),
            lane: Lanes::DEFAULT,
            effects: Flags::NONE,
            host_mutations: mutations,
            units_rendered: 4,
        }
    }

    fn test_root() -> RootHandle {
        let mut host = NoopHost::new();
        let container = host.create_container();
        Reconciler::new(host).create_root(container)
    }

    #[test]
    fn hud_smooths_commit_rate() {
        let mut hud = Hud::new();
        let t0 = Instant::now();
        hud.record_at(&info(1), t0);
        assert_eq!(hud.commit_rate(), 0.0);
        hud.record_at(&info(3), t0 + Duration::from_millis(100));
        assert!((hud.commit_rate() - 10.0).abs() < 0.01);
        hud.record_at(&info(0), t0 + Duration::from_millis(150));
        // 0.8 * 10 + 0.2 * 20
        assert!((hud.commit_rate() - 12.0).abs() < 0.01);

        assert_eq!(
            hud.overlay(),
            "commits: 3  |  rate: 12.0/s  |  lane: DEFAULT  |  mutations: 0  |  units: 4"
        );
        hud.toggle();
        assert_eq!(hud.overlay(), "");
    }

    #[test]
    fn outline_indents_by_depth() {
        let unit = |depth, tag, label: &str, key: Option<&str>, flags| InspectedUnit {
            depth,
            tag,
            label: label.to_string(),
            key: key.map(str::to_string),
            flags,
        };
        let units = vec![
            unit(0, WorkTag::HostRoot, "#root", None, Flags::NONE),
            unit(1, WorkTag::HostComponent, "ul", None, Flags::NONE),
            unit(2, WorkTag::HostComponent, "li", Some("a"), Flags::PLACEMENT),
        ];
        insta::assert_snapshot!(render_outline(&units), @r"
        #root
          ul
            li key=a Flags(PLACEMENT)
        ");
    }

    #[test]
    fn inspector_follows_a_live_reconciler() {
        let mut host = NoopHost::new();
        let container = host.create_container();
        let mut r = Reconciler::with_config(host, ReconcilerConfig::new());
        let root = r.create_root(container);
        let inspector = Inspector::new(&mut r);

        r.flush_sync(|r| {
            r.update_root(h("ul").child(h("li").key("a").text("x")).into(), root);
        })
        .unwrap();
        assert_eq!(inspector.hud.borrow().commit_count(), 1);

        insta::assert_snapshot!(inspector.dump(&r, root).unwrap(), @r#"
        #root
          ul
            li key=a
              #text "x"
        "#);

        let snapshot = inspector.snapshot(&r, root).unwrap();
        let json = snapshot.to_json().unwrap();
        assert_eq!(TreeSnapshot::from_json(&json).unwrap(), snapshot);
        assert_eq!(snapshot.units[2].kind, "HostComponent");
        assert_eq!(snapshot.units[2].key.as_deref(), Some("a"));
    }
}
