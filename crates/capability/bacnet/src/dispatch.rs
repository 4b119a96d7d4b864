//! 分发循环
//!
//! 带超时地接收数据报；收到后持锁执行 `npdu_handler`，释放锁；
//! 然后执行 `ms_tick`：不持锁地把发件箱中的报文写入套接字。

use crate::lock::{Actor, StackLock};
use crate::stack::OutboxReceiver;
use gw_telemetry::{record_datagram_dispatched, record_datagram_dropped};
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// B/IP 最大报文长度
const MAX_MPDU: usize = 1506;

pub struct DispatchLoop {
    socket: UdpSocket,
    lock: StackLock,
    outbox: OutboxReceiver,
    receive_timeout: Duration,
}

impl DispatchLoop {
    pub async fn bind(
        addr: SocketAddr,
        lock: StackLock,
        outbox: OutboxReceiver,
        receive_timeout: Duration,
    ) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        socket.set_broadcast(true)?;
        Ok(Self {
            socket,
            lock,
            outbox,
            receive_timeout,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        let mut buf = vec![0u8; MAX_MPDU];
        info!(
            target: "gw.dispatch",
            local = ?self.socket.local_addr().ok(),
            receive_timeout_ms = self.receive_timeout.as_millis() as u64,
            "dispatch_loop_started"
        );

        loop {
            let received = tokio::select! {
                _ = cancel.cancelled() => break,
                received = timeout(self.receive_timeout, self.socket.recv_from(&mut buf)) => received,
            };

            match received {
                Ok(Ok((len, src))) => self.dispatch(src, &buf[..len]),
                Ok(Err(err)) => {
                    warn!(target: "gw.dispatch", error = %err, "udp_receive_failed");
                }
                Err(_) => {}
            }

            self.ms_tick().await;
        }

        self.ms_tick().await;
        info!(target: "gw.dispatch", "dispatch_loop_stopped");
    }

    fn dispatch(&self, src: SocketAddr, datagram: &[u8]) {
        let result = self
            .lock
            .with(Actor::Dispatch, |state| state.npdu_handler(src, datagram));
        match result {
            Ok(()) => record_datagram_dispatched(),
            Err(err) => {
                record_datagram_dropped();
                debug!(
                    target: "gw.dispatch",
                    %src,
                    len = datagram.len(),
                    error = %err,
                    "datagram_dropped"
                );
            }
        }
    }

    /// 不持锁的周期簿记：发送处理器应答与定时器产生的报文
    pub async fn ms_tick(&mut self) {
        while let Ok(outgoing) = self.outbox.try_recv() {
            if let Err(err) = self.socket.send_to(&outgoing.datagram, outgoing.to).await {
                warn!(
                    target: "gw.dispatch",
                    to = %outgoing.to,
                    error = %err,
                    "udp_send_failed"
                );
            }
        }
    }
}
