use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpListener,
};

use crate::{
    config::{self, Config},
    error::Error,
    network::{self, ClientEventLoop},
    protocol::Router,
    Hook, HookNoop,
};

/// 代表一个 mqtt 节点
pub struct Broker {
    cfg: Config,
    router: Arc<Router>,
}

impl Broker {
    pub fn new(cfg: Config) -> Self {
        let router = Arc::new(Router::new(&cfg.session));
        Self { cfg, router }
    }

    pub async fn start(&self) -> Result<(), Error> {
        self.start_with_hook(Arc::new(HookNoop)).await
    }

    /// 开启客户端连接监听，每个连接一个事件循环
    pub async fn start_with_hook<H: Hook>(&self, hook: Arc<H>) -> Result<(), Error> {
        let listener = TcpListener::bind(&self.cfg.broker.client_addr).await?;
        info!("listening on {}", self.cfg.broker.client_addr);

        loop {
            // 获取到连接
            let (stream, addr) = match listener.accept().await {
                Ok((s, a)) => (s, a),
                Err(e) => {
                    error!("accept tcp stream err: {}", e);
                    continue;
                }
            };
            debug!("new stream comming in: {}", addr);

            tokio::spawn(serve(
                stream,
                self.router.clone(),
                hook.clone(),
                self.cfg.session.clone(),
            ));
        }
    }

    /// 处理一个已经建立的字节流连接，直到连接关闭
    /// tcp，适配后的 websocket 或者内存管道都可以
    pub async fn handle_connection<S>(&self, stream: S)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        self.handle_connection_with_hook(stream, Arc::new(HookNoop))
            .await
    }

    pub async fn handle_connection_with_hook<S, H>(&self, stream: S, hook: Arc<H>)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
        H: Hook,
    {
        serve(stream, self.router.clone(), hook, self.cfg.session.clone()).await
    }
}

/// 单个连接的完整生命周期，错误只影响这一个连接
async fn serve<S, H>(stream: S, router: Arc<Router>, hook: Arc<H>, session_cfg: config::Session)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    H: Hook,
{
    let event_loop = match ClientEventLoop::new(stream, router, hook, &session_cfg).await {
        Ok(event_loop) => event_loop,
        Err(e) => {
            warn!("eventloop read first connect packet err: {:#}", e);
            return;
        }
    };

    let client_id = event_loop.client_id().to_owned();
    match event_loop.start().await {
        Ok(()) => {}
        Err(network::Error::Connection(e)) => {
            info!("client {} connection closed: {}", client_id, e)
        }
        Err(e) => error!("eventloop on client {0} exit error: {1:#}", client_id, e),
    }
}
