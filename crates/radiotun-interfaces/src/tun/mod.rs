//! Linux TUN/TAP device.
//!
//! The interface is allocated with the `tun` crate, which attaches to an
//! existing persistent interface of the same name or creates a new one.
//! Persistence and the TAP hardware address are applied afterwards on the
//! same descriptor, so peers can address this node through ARP.

use std::fs::File;
use std::io::{Read, Write};
use std::os::fd::{AsFd, AsRawFd, FromRawFd, IntoRawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use nix::sys::eventfd::{EfdFlags, EventFd};
use radiotun_core::constants::MAX_FRAME_SIZE;
use radiotun_core::{InterfaceMode, NodeAddress, hardware_address};
use tun::AbstractDevice;

use crate::error::InterfaceError;
use crate::traits::VirtualInterface;

mod ioctl {
    // TUNSETPERSIST is _IOW('T', 203, int) in <linux/if_tun.h>.
    nix::ioctl_write_int!(tun_set_persist, b'T', 203);
    nix::ioctl_write_ptr_bad!(set_hardware_address, libc::SIOCSIFHWADDR, libc::ifreq);
}

/// Parameters for allocating a [`TunDevice`].
#[derive(Debug, Clone)]
pub struct TunConfig {
    /// Requested interface name; the kernel picks one if empty.
    pub name: String,
    pub mode: InterfaceMode,
    /// Node address used to derive the TAP hardware address.
    pub address: NodeAddress,
    /// Keep the interface after the process exits.
    pub persist: bool,
}

/// An attached TUN/TAP interface.
///
/// Reads and writes go through `&File`, so one thread can read while another
/// writes without locking. [`VirtualInterface::close`] marks the device
/// closed and wakes a reader parked in `poll` through an eventfd; the
/// descriptor itself is released when the last owner drops the device.
pub struct TunDevice {
    file: File,
    wake: EventFd,
    closed: AtomicBool,
    name: String,
    mode: InterfaceMode,
}

impl TunDevice {
    /// Attach to the interface described by `config`.
    pub fn open(config: &TunConfig) -> Result<Self, InterfaceError> {
        let alloc_err = |reason: String| InterfaceError::Allocation {
            name: config.name.clone(),
            reason,
        };

        let mut tun_config = tun::Configuration::default();
        tun_config.layer(match config.mode {
            InterfaceMode::Tun => tun::Layer::L3,
            InterfaceMode::Tap => tun::Layer::L2,
        });
        if !config.name.is_empty() {
            tun_config.tun_name(&config.name);
        }

        let device = tun::create(&tun_config).map_err(|e| {
            alloc_err(format!(
                "{e} (if switching between TUN and TAP, delete the old interface \
                 first: ip link delete {})",
                config.name
            ))
        })?;
        let name = device.tun_name().unwrap_or_else(|_| config.name.clone());
        // SAFETY: `into_raw_fd` gives up the device's ownership of the
        // descriptor, so `file` becomes its only owner.
        let file = unsafe { File::from_raw_fd(device.into_raw_fd()) };

        if config.persist {
            // SAFETY: TUNSETPERSIST takes its flag by value on an attached tun descriptor.
            unsafe { ioctl::tun_set_persist(file.as_raw_fd(), 1) }
                .map_err(|e| alloc_err(format!("TUNSETPERSIST failed: {e}")))?;
        }

        if config.mode.is_ethernet() {
            let mac = hardware_address(config.address);
            let req = hardware_address_request(mac);
            // SAFETY: `req` is a fully initialized `ifreq` that outlives the call.
            if let Err(e) = unsafe { ioctl::set_hardware_address(file.as_raw_fd(), &req) } {
                tracing::warn!("TAP: failed to set hardware address {:02x?}: {e}", mac);
            }
        }

        let wake = EventFd::from_flags(EfdFlags::EFD_CLOEXEC | EfdFlags::EFD_NONBLOCK)
            .map_err(std::io::Error::from)?;

        tracing::info!("attached to {} device {name}", config.mode);
        Ok(Self {
            file,
            wake,
            closed: AtomicBool::new(false),
            name,
            mode: config.mode,
        })
    }

    fn ensure_open(&self) -> Result<(), InterfaceError> {
        if self.closed.load(Ordering::Acquire) {
            Err(InterfaceError::Closed)
        } else {
            Ok(())
        }
    }
}

/// `struct ifreq` carrying an Ethernet hardware address. The tun driver
/// ignores the name on its own descriptor.
fn hardware_address_request(mac: [u8; 6]) -> libc::ifreq {
    let mut sa_data = [0 as libc::c_char; 14];
    for (dst, src) in sa_data.iter_mut().zip(mac) {
        *dst = src as libc::c_char;
    }
    libc::ifreq {
        ifr_name: [0; libc::IFNAMSIZ],
        ifr_ifru: libc::__c_anonymous_ifr_ifru {
            ifru_hwaddr: libc::sockaddr {
                sa_family: libc::ARPHRD_ETHER,
                sa_data,
            },
        },
    }
}

/// Classify the device's poll result. `Ok(true)` means a read will not block.
fn readiness(revents: PollFlags) -> Result<bool, InterfaceError> {
    if revents.intersects(PollFlags::POLLNVAL | PollFlags::POLLHUP) {
        return Err(InterfaceError::Closed);
    }
    Ok(revents.intersects(PollFlags::POLLIN | PollFlags::POLLERR))
}

impl VirtualInterface for TunDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn mode(&self) -> InterfaceMode {
        self.mode
    }

    fn mtu(&self) -> usize {
        MAX_FRAME_SIZE
    }

    fn wait_readable(&self, timeout: Duration) -> Result<bool, InterfaceError> {
        self.ensure_open()?;
        let millis = u16::try_from(timeout.as_millis()).unwrap_or(u16::MAX);
        let mut fds = [
            PollFd::new(self.file.as_fd(), PollFlags::POLLIN),
            PollFd::new(self.wake.as_fd(), PollFlags::POLLIN),
        ];
        match poll(&mut fds, PollTimeout::from(millis)) {
            Ok(_) => {}
            Err(Errno::EINTR) => return Ok(false),
            Err(e) => return Err(std::io::Error::from(e).into()),
        }
        self.ensure_open()?;
        readiness(fds[0].revents().unwrap_or(PollFlags::empty()))
    }

    fn read_frame(&self, buf: &mut [u8]) -> Result<usize, InterfaceError> {
        self.ensure_open()?;
        Ok((&self.file).read(buf)?)
    }

    fn write_frame(&self, frame: &[u8]) -> Result<usize, InterfaceError> {
        self.ensure_open()?;
        Ok((&self.file).write(frame)?)
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            if let Err(e) = self.wake.arm() {
                tracing::warn!("failed to wake {} reader: {e}", self.name);
            }
            tracing::debug!("released {}", self.name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hardware_address_request_carries_ethernet_address() {
        let mac = hardware_address(NodeAddress::new(0o1).unwrap());
        let req = hardware_address_request(mac);
        assert!(req.ifr_name.iter().all(|c| *c == 0));
        // SAFETY: the request was built with the hwaddr variant.
        let hwaddr = unsafe { req.ifr_ifru.ifru_hwaddr };
        assert_eq!(hwaddr.sa_family, libc::ARPHRD_ETHER);
        let bytes: Vec<u8> = hwaddr.sa_data[..6].iter().map(|c| *c as u8).collect();
        assert_eq!(bytes, b"RF24\x01\x00");
    }

    #[test]
    fn hangup_is_reported_as_closed() {
        assert!(matches!(
            readiness(PollFlags::POLLHUP),
            Err(InterfaceError::Closed)
        ));
        assert!(matches!(
            readiness(PollFlags::POLLNVAL),
            Err(InterfaceError::Closed)
        ));
    }

    #[test]
    fn readable_and_error_wake_the_reader() {
        assert!(readiness(PollFlags::POLLIN).unwrap());
        assert!(readiness(PollFlags::POLLERR).unwrap());
        assert!(!readiness(PollFlags::empty()).unwrap());
    }
}
