//! `EspHttpServer` 上的门户挂载点
//!
//! 服务器上注册两个通配路由（GET/POST `/*`），请求交给当前挂载的
//! 门户处理器；没有挂载时一律 404。集成方自己的路由需要在创建
//! `EspRouteHost` 之前注册，httpd 按注册顺序匹配。

use std::sync::{Arc, Mutex};

use esp_idf_svc::{
    http::{
        server::{Configuration, EspHttpConnection, EspHttpServer, Request},
        Headers, Method,
    },
    io::{Read, Write},
};

use crate::captive_portal::handlers::{parse_form, MAX_FORM_BODY};
use crate::captive_portal::{dispatch, PortalHandler, PortalRequest, RouteHost};
use crate::error::HostError;
use crate::lock;

type HandlerSlot = Arc<Mutex<Option<Arc<dyn PortalHandler>>>>;

pub struct EspRouteHost {
    server: EspHttpServer<'static>,
    slot: HandlerSlot,
}

impl EspRouteHost {
    /// 门户需要的服务器配置，打开了通配匹配
    pub fn configuration() -> Configuration {
        Configuration {
            stack_size: 8192,
            max_uri_handlers: 12,
            uri_match_wildcard: true,
            ..Default::default()
        }
    }

    pub fn new() -> anyhow::Result<Self> {
        let server = EspHttpServer::new(&Self::configuration())?;
        Self::from_server(server)
    }

    /// `server` 必须用 [`Self::configuration`] 之类打开通配匹配的配置创建
    pub fn from_server(mut server: EspHttpServer<'static>) -> anyhow::Result<Self> {
        let slot: HandlerSlot = Arc::new(Mutex::new(None));

        for method in [Method::Get, Method::Post] {
            let slot = slot.clone();
            server.fn_handler::<anyhow::Error, _>("/*", method, move |req| {
                handle_request(req, &slot)
            })?;
        }

        log::info!("[HTTP] Server started on port 80");
        Ok(Self { server, slot })
    }

    pub fn server_mut(&mut self) -> &mut EspHttpServer<'static> {
        &mut self.server
    }
}

impl RouteHost for EspRouteHost {
    fn mount(&mut self, handler: Arc<dyn PortalHandler>) -> Result<(), HostError> {
        *lock(&self.slot) = Some(handler);
        log::info!("[HTTP] Portal routes mounted");
        Ok(())
    }

    fn unmount(&mut self) {
        lock(&self.slot).take();
        log::info!("[HTTP] Portal routes removed");
    }
}

/// 超过 [`MAX_FORM_BODY`] 时不读取，返回 `None`
fn read_request_body(
    req: &mut Request<&mut EspHttpConnection<'_>>,
) -> anyhow::Result<Option<Vec<u8>>> {
    let len = req.content_len().unwrap_or(0) as usize;
    if len > MAX_FORM_BODY {
        return Ok(None);
    }

    let mut body = vec![0_u8; len];
    if len > 0 {
        req.read_exact(&mut body)?;
    }
    Ok(Some(body))
}

fn handle_request(
    mut req: Request<&mut EspHttpConnection<'_>>,
    slot: &HandlerSlot,
) -> anyhow::Result<()> {
    let method = match req.method() {
        Method::Post => http::Method::POST,
        _ => http::Method::GET,
    };
    // 门户期间 STA 没有链路，能访问到的客户端都来自 AP
    let mut request = PortalRequest::new(method, req.uri());

    if request.method == http::Method::POST {
        request = match read_request_body(&mut req)? {
            Some(body) => {
                request.form = parse_form(&String::from_utf8_lossy(&body));
                request
            }
            None => request.with_body_too_large(),
        };
    }

    let handler = lock(slot).clone();
    let response = dispatch(handler.as_deref(), &request);

    let mut resp = req.into_response(
        response.status.as_u16(),
        response.status.canonical_reason(),
        &response.headers,
    )?;
    resp.write_all(&response.body)?;
    Ok(())
}
