use std::cell::RefCell;
use std::rc::Rc;

use repose_devtools::Inspector;
use repose_noop::NoopHost;
use repose_reconciler::*;

type Buttons = Rc<RefCell<Option<SetState<i32>>>>;

fn counter(buttons: Buttons) -> Component {
    Component::new("Counter", move |hooks, _| {
        let (count, set_count) = hooks.use_state(|| 0i32)?;
        *buttons.borrow_mut() = Some(set_count);

        hooks.use_effect(
            move || {
                log::info!("count is now {count}");
                None
            },
            Some(deps![count]),
        )?;

        let history: Node = (0..count.max(0))
            .rev()
            .map(|n| Node::from(h("li").key(n).text(format!("#{n}"))))
            .collect();
        Ok(h("section")
            .child(h("h1").text(format!("Count: {count}")))
            .child(h("ul").child(history))
            .into())
    })
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let mut host = NoopHost::new();
    let container = host.create_container();
    let mut reconciler = Reconciler::new(host);
    let root = reconciler.create_root(container);
    let inspector = Inspector::new(&mut reconciler);

    let buttons: Buttons = Rc::default();
    reconciler.update_root(counter(buttons.clone()).element().into(), root);
    reconciler.run_until_idle()?;
    println!("{}", reconciler.host().to_markup(container));

    let clicks: [fn(&i32) -> i32; 4] = [|c| c + 1, |c| c + 1, |c| c - 1, |c| c + 2];
    for click in clicks {
        let set_count = buttons
            .borrow()
            .clone()
            .ok_or_else(|| anyhow::anyhow!("counter never rendered"))?;
        // Clicks are discrete input: render them before returning to the loop.
        reconciler.flush_sync(|_| set_count.update(click))?;
        reconciler.run_until_idle()?;
        println!("{}", reconciler.host().to_markup(container));
        println!("{}", inspector.hud.borrow().overlay());
    }

    println!("{}", inspector.dump(&reconciler, root)?);
    Ok(())
}
