use std::sync::Arc;

use tracing_subscriber::EnvFilter;
use wrapp_graph::{BindingSpec, Bindings, Container, Factory, Lifetime};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let bindings = Bindings::new()
        .bind(BindingSpec::instance(Settings {
            greeting: "Hello".to_string(),
        }))
        .and_then(|bindings| {
            bindings.bind(
                BindingSpec::of::<Counter>(Factory::of(Counter::default))
                    .with(Lifetime::PerContainer),
            )
        })
        .and_then(|bindings| {
            bindings.bind(
                BindingSpec::of::<Greeter>(Factory::of(Greeter::new))
                    .decorate_with(Factory::of(|inner: Arc<Greeter>| inner.shout())),
            )
        });

    let bindings = match bindings {
        Ok(bindings) => bindings,
        Err(e) => {
            eprintln!("{e}");
            return;
        }
    };

    let container = match Container::build(&bindings) {
        Ok(container) => container,
        Err(e) => {
            eprintln!("{e}");
            return;
        }
    };

    println!("{:?}", container);
    for plan in container.plans().iter() {
        println!("{} = {}", plan.target(), plan.expression());
    }

    match container.require::<Greeter>() {
        Ok(greeter) => println!("{}", greeter.message),
        Err(e) => eprintln!("{e}"),
    }
}

#[derive(Debug)]
struct Settings {
    greeting: String,
}

#[derive(Debug, Default)]
struct Counter {
    created: std::sync::atomic::AtomicUsize,
}

#[derive(Debug)]
struct Greeter {
    message: String,
}
impl Greeter {
    fn new(settings: Arc<Settings>, counter: Arc<Counter>) -> Self {
        let count = counter
            .created
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Greeter {
            message: format!("{} #{count}", settings.greeting),
        }
    }

    fn shout(&self) -> Greeter {
        Greeter {
            message: format!("{}!", self.message.to_uppercase()),
        }
    }
}
