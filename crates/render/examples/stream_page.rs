//! Renders a small product page twice onto stdout: once for a browser, which gets the shell
//! first and the reviews streamed behind it, and once for a crawler, which gets the whole page.
//!
//! cargo run -p micro-render --example stream_page

use std::sync::{Arc, Mutex};
use std::time::Duration;

use http::Method;
use micro_render::{RenderAdapter, RenderCallbacks, RenderEngine, RenderHandle, Strategy};
use micro_render_http::cancel::AbortSignal;
use micro_render_http::protocol::body::EmitterHandle;
use micro_render_http::request::{CanonicalRequest, NativeRequest};
use micro_render_http::sink::WireSink;
use tokio::select;
use tokio::sync::oneshot;
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

struct ProductPage;

struct Product {
    name: &'static str,
    reviews: Vec<&'static str>,
}

struct PageRender {
    pipe: Mutex<Option<oneshot::Sender<EmitterHandle>>>,
}

impl RenderHandle for PageRender {
    fn pipe(&self, pipe: EmitterHandle) {
        if let Some(sender) = self.pipe.lock().ok().and_then(|mut pipe| pipe.take()) {
            let _ = sender.send(pipe);
        }
    }

    fn abort(&self) {
        info!("render torn down");
    }
}

impl RenderEngine for ProductPage {
    type Document = Product;

    fn render(
        &self,
        request: &CanonicalRequest,
        product: &Product,
        callbacks: RenderCallbacks,
        signal: AbortSignal,
    ) -> Arc<dyn RenderHandle> {
        let (sender, receiver) = oneshot::channel();
        let shell = format!("<html><head><title>{}</title></head><body><h1>{}</h1>", product.name, product.name);
        let reviews: Vec<String> = product.reviews.iter().map(|review| format!("<p>{review}</p>")).collect();
        info!(uri = %request.uri(), "rendering product page");

        tokio::spawn(produce(shell, reviews, callbacks, signal, receiver));

        Arc::new(PageRender { pipe: Mutex::new(Some(sender)) })
    }
}

async fn produce(
    shell: String,
    reviews: Vec<String>,
    callbacks: RenderCallbacks,
    signal: AbortSignal,
    receiver: oneshot::Receiver<EmitterHandle>,
) {
    let interactive = callbacks.strategy() == Strategy::Interactive;
    let mut receiver = Some(receiver);
    let mut pipe = None;
    let mut pending = vec![shell];

    callbacks.shell_ready();
    for review in reviews {
        if interactive && pipe.is_none() {
            pipe = piped(&mut receiver).await;
        }
        if let Some(pipe) = &pipe {
            for chunk in pending.drain(..) {
                pipe.data(chunk.as_bytes());
            }
        }

        // every review resolves a suspended boundary a little later
        select! {
            () = tokio::time::sleep(Duration::from_millis(30)) => pending.push(review),
            _ = signal.aborted() => return,
        }
    }
    pending.push("</body></html>".to_owned());
    callbacks.all_ready();

    if pipe.is_none() {
        pipe = piped(&mut receiver).await;
    }
    let Some(pipe) = pipe else { return };
    for chunk in pending {
        pipe.data(chunk.as_bytes());
    }
    pipe.end();
}

async fn piped(receiver: &mut Option<oneshot::Receiver<EmitterHandle>>) -> Option<EmitterHandle> {
    receiver.take()?.await.ok()
}

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).with_writer(std::io::stderr).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let adapter = RenderAdapter::builder()
        .engine(ProductPage)
        .abort_delay(Duration::from_secs(2))
        .build()
        .unwrap();

    let product = Product { name: "Mechanical Keyboard", reviews: vec!["Loud, in a good way.", "Keycaps feel great."] };

    for user_agent in ["Mozilla/5.0 (X11; Linux x86_64) Firefox/126.0", "Googlebot/2.1"] {
        let native = NativeRequest::new(Method::GET, "/products/42")
            .header("host", "localhost:8080")
            .header("user-agent", user_agent);
        let mut sink = WireSink::new(tokio::io::stdout());

        info!(user_agent, "request");
        if let Err(e) = adapter.handle(native, &mut sink, &product).await {
            error!(cause = %e, "render failed");
        }
        println!();
    }
}
