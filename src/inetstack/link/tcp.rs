// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! TCP network link.
//!
//! Wraps a single TCP socket of the external stack as a generic network
//! link. The remote endpoint is configured either as a DNS name or as a
//! fixed IP address; once configured, both flavours connect through the
//! same state machine. State advances on stack notifications and on the
//! worker task, which drives the DNS lookup and connection retry polling.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::inetstack::{
    dns::SharedDnsClient,
    link::{
        LinkNotify,
        LinkNotifyCallback,
        NetworkLink,
    },
};
use crate::runtime::{
    memory::Buffer,
    network::{
        config::LinkConfig,
        socket::{
            DhcpClient,
            SocketStack,
        },
        types::{
            NetworkStatus,
            NotifyCallback,
            SocketId,
            StackNotify,
        },
    },
    scheduler::{
        SharedScheduler,
        TaskHandle,
        TaskStatus,
    },
    ticks::duration_to_ticks,
    SharedBox,
    SharedObject,
};
use ::std::{
    net::IpAddr,
    ops::{
        Deref,
        DerefMut,
    },
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// TCP link state machine states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LinkState {
    /// No remote endpoint configured.
    Initialised,
    /// Remote endpoint configured, link inactive.
    Configured,
    /// Socket open requested, waiting for the opened notification.
    Opening,
    /// Resolving the remote DNS name.
    DnsLookup,
    /// Issuing the connection request.
    TcpConnect,
    /// Connection requested, waiting for the connected notification.
    TcpWait,
    /// Connection established.
    Connected,
    /// Local close requested, waiting for the closed notification.
    Closing,
    /// The connection process failed.
    Failure,
}

/// TCP network link instance.
pub struct TcpLink {
    /// Link configuration descriptor.
    config: LinkConfig,
    /// Scheduler running the worker task.
    scheduler: SharedScheduler,
    /// External TCP/IP stack socket driver.
    stack: SharedBox<dyn SocketStack>,
    /// DNS client used for name based endpoint configurations.
    dns: SharedDnsClient,
    /// External DHCP client used for link monitoring.
    dhcp: Option<SharedBox<dyn DhcpClient>>,
    /// Current state machine state.
    state: LinkState,
    /// Use IPv6 addressing for this link?
    use_ipv6: bool,
    /// Remote DNS name for name based configurations.
    remote_name: Option<String>,
    /// Remote address, fixed or resolved from the DNS name.
    remote_addr: Option<IpAddr>,
    /// Remote TCP port.
    remote_port: u16,
    /// Local TCP port.
    local_port: u16,
    /// Open TCP socket, when one exists.
    socket: Option<SocketId>,
    /// Client notification callback.
    notify_handler: Option<LinkNotifyCallback>,
    /// Worker task driving the connection process.
    worker: Option<TaskHandle>,
}

#[derive(Clone)]
pub struct SharedTcpLink(SharedObject<TcpLink>);

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl SharedTcpLink {
    /// Creates a TCP link and starts its worker task on the given
    /// scheduler. The link must be configured before connecting.
    pub fn new(
        config: LinkConfig,
        mut scheduler: SharedScheduler,
        stack: SharedBox<dyn SocketStack>,
        dns: SharedDnsClient,
        dhcp: Option<SharedBox<dyn DhcpClient>>,
        use_ipv6: bool,
    ) -> Self {
        let mut link: SharedTcpLink = Self(SharedObject::new(TcpLink {
            config,
            scheduler: scheduler.clone(),
            stack,
            dns,
            dhcp,
            state: LinkState::Initialised,
            use_ipv6,
            remote_name: None,
            remote_addr: None,
            remote_port: 0,
            local_port: 0,
            socket: None,
            notify_handler: None,
            worker: None,
        }));
        let mut worker_ref: SharedTcpLink = link.clone();
        let worker: TaskHandle = scheduler.start_task("tcp-link", Box::new(move || worker_ref.worker_tick()));
        link.worker = Some(worker);
        link
    }

    /// Handles a notification from the socket driver, advancing the state
    /// machine and waking the worker task on any state change.
    fn stack_notify(&mut self, notification: StackNotify) {
        let next_state: LinkState = match (self.state, notification) {
            (LinkState::Opening, StackNotify::TcpSocketOpened) => {
                if self.remote_name.is_some() {
                    LinkState::DnsLookup
                } else {
                    LinkState::TcpConnect
                }
            },
            (LinkState::TcpWait, StackNotify::TcpSocketConnected) => {
                debug!("stack_notify(): TCP socket connected");
                self.client_notify(LinkNotify::Connected);
                LinkState::Connected
            },

            // A close in the connected state was initiated by the remote
            // host; a close in the closing state completes a local request.
            (LinkState::Connected | LinkState::Closing, StackNotify::TcpSocketClosed) => {
                debug!("stack_notify(): TCP socket closed");
                self.socket = None;
                self.client_notify(LinkNotify::Disconnected);
                LinkState::Configured
            },
            _ => return,
        };
        self.state = next_state;
        if let Some(worker) = self.worker {
            self.scheduler.resume(worker);
        }
    }
}

impl TcpLink {
    /// Configures the remote endpoint by DNS name. The link can not be
    /// reconfigured while it is in use.
    pub fn configure_name(&mut self, remote_name: &str, remote_port: u16, local_port: u16) -> bool {
        if self.state != LinkState::Initialised && self.state != LinkState::Configured {
            return false;
        }
        self.remote_name = Some(remote_name.to_string());
        self.remote_addr = None;
        self.remote_port = remote_port;
        self.local_port = local_port;
        self.state = LinkState::Configured;
        true
    }

    /// Configures the remote endpoint by fixed IP address. The link can not
    /// be reconfigured while it is in use.
    pub fn configure_address(&mut self, remote_addr: IpAddr, remote_port: u16, local_port: u16) -> bool {
        if self.state != LinkState::Initialised && self.state != LinkState::Configured {
            return false;
        }
        self.remote_name = None;
        self.remote_addr = Some(remote_addr);
        self.remote_port = remote_port;
        self.local_port = local_port;
        self.state = LinkState::Configured;
        true
    }

    /// Delivers a notification to the link client, if a handler is set.
    fn client_notify(&mut self, notification: LinkNotify) {
        if let Some(handler) = self.notify_handler.as_mut() {
            handler(notification);
        }
    }

    /// Worker task loop. Drives the DNS lookup and connection request
    /// polling; all other states advance on stack notifications.
    fn worker_tick(&mut self) -> TaskStatus {
        match self.state {
            LinkState::DnsLookup => {
                let remote_name: String = match self.remote_name.clone() {
                    Some(remote_name) => remote_name,
                    None => {
                        self.state = LinkState::Failure;
                        return TaskStatus::Suspend;
                    },
                };
                match self.dns.query(&remote_name, self.use_ipv6) {
                    Ok(remote_addr) => {
                        self.remote_addr = Some(remote_addr);
                        self.state = LinkState::TcpConnect;
                        TaskStatus::RunImmediate
                    },
                    Err(NetworkStatus::Retry) => {
                        TaskStatus::RunLater(duration_to_ticks(self.config.get_dns_poll_interval()))
                    },
                    Err(status) => {
                        warn!("worker_tick(): DNS lookup failed with status {}", status);
                        self.state = LinkState::Failure;
                        TaskStatus::Suspend
                    },
                }
            },
            LinkState::TcpConnect => {
                let (socket, remote_addr): (SocketId, IpAddr) = match (self.socket, self.remote_addr) {
                    (Some(socket), Some(remote_addr)) => (socket, remote_addr),
                    _ => {
                        self.state = LinkState::Failure;
                        return TaskStatus::Suspend;
                    },
                };
                match self.stack.tcp_connect(socket, remote_addr, self.remote_port) {
                    NetworkStatus::Success => {
                        self.state = LinkState::TcpWait;
                        TaskStatus::RunImmediate
                    },
                    NetworkStatus::Retry => {
                        TaskStatus::RunLater(duration_to_ticks(self.config.get_connect_retry_interval()))
                    },
                    status => {
                        warn!("worker_tick(): TCP connect failed with status {}", status);
                        self.state = LinkState::Failure;
                        TaskStatus::Suspend
                    },
                }
            },
            _ => TaskStatus::Suspend,
        }
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl NetworkLink for SharedTcpLink {
    /// Opens the link socket and starts the connection process. Only valid
    /// once the link has been configured.
    fn connect(&mut self) -> NetworkStatus {
        if self.state != LinkState::Configured {
            return NetworkStatus::NotValid;
        }
        let worker: TaskHandle = match self.worker {
            Some(worker) => worker,
            None => return NetworkStatus::DriverFailure,
        };
        let mut notify_ref: SharedTcpLink = self.clone();
        let notify: NotifyCallback = Box::new(move |notification| notify_ref.stack_notify(notification));
        let use_ipv6: bool = self.use_ipv6;
        let local_port: u16 = self.local_port;
        let socket: SocketId = match self.stack.tcp_open(use_ipv6, local_port, worker, notify) {
            Some(socket) => socket,
            None => return NetworkStatus::Retry,
        };
        self.socket = Some(socket);
        self.state = LinkState::Opening;
        NetworkStatus::Success
    }

    /// Closes the link socket. Only valid while the link is connected.
    fn disconnect(&mut self) -> NetworkStatus {
        if self.state != LinkState::Connected {
            return NetworkStatus::NotConnected;
        }
        let socket: SocketId = match self.socket {
            Some(socket) => socket,
            None => return NetworkStatus::NotConnected,
        };
        let status: NetworkStatus = self.stack.tcp_close(socket);
        if status == NetworkStatus::Success {
            self.state = LinkState::Closing;
        }
        status
    }

    fn send(&mut self, payload: &mut Buffer) -> NetworkStatus {
        let socket: SocketId = match self.socket {
            Some(socket) => socket,
            None => return NetworkStatus::NotConnected,
        };
        if self.state != LinkState::Connected {
            return NetworkStatus::NotConnected;
        }
        self.stack.tcp_send(socket, payload)
    }

    /// Receives queued link data. The socket is drained first, so data
    /// queued before a remote close can still be read; only once no data
    /// remains is a disconnected link reported as such.
    fn receive(&mut self, payload: &mut Buffer) -> NetworkStatus {
        let status: NetworkStatus = match self.socket {
            Some(socket) => self.stack.tcp_receive(socket, payload),
            None => NetworkStatus::NotOpen,
        };
        if status != NetworkStatus::Success && self.state != LinkState::Connected {
            return NetworkStatus::NotConnected;
        }
        status
    }

    fn monitor(&self) -> NetworkStatus {
        // Link monitoring requires the DHCP service for valid network
        // settings.
        let dhcp: &SharedBox<dyn DhcpClient> = match self.dhcp.as_ref() {
            Some(dhcp) => dhcp,
            None => return NetworkStatus::Unsupported,
        };
        if !dhcp.ready() {
            return NetworkStatus::NetworkDown;
        }
        match self.state {
            LinkState::Connected => NetworkStatus::Connected,
            LinkState::Configured => NetworkStatus::NotConnected,
            LinkState::Initialised => NetworkStatus::NotValid,
            LinkState::Failure => NetworkStatus::DriverFailure,
            _ => NetworkStatus::Retry,
        }
    }

    fn set_notify_handler(&mut self, notify: LinkNotifyCallback) {
        self.notify_handler = Some(notify);
    }
}

impl Deref for SharedTcpLink {
    type Target = TcpLink;

    fn deref(&self) -> &Self::Target {
        self.0.deref()
    }
}

impl DerefMut for SharedTcpLink {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.0.deref_mut()
    }
}
