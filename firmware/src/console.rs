//! Calibration console over USB CDC-ACM.
//!
//! Reads newline-terminated command lines, forwards parsed commands to the
//! control task and writes back its responses. Lines that fail to parse are
//! answered here without involving the control task.

use embassy_rp::peripherals::USB;
use embassy_rp::usb::Driver;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_usb::class::cdc_acm::CdcAcmClass;
use embassy_usb::driver::EndpointError;
use heapless::Vec;
use pad_core::pad_proto::{
    parse_command, Command, Response, ResponseError, MAX_COMMAND_LENGTH, MAX_RESPONSE_SIZE,
};

/// CDC-ACM class on the RP2040 USB peripheral.
pub type ConsoleClass = CdcAcmClass<'static, Driver<'static, USB>>;

/// Parsed commands for the control task.
pub type CommandChannel = Channel<CriticalSectionRawMutex, Command, 2>;

/// Responses from the control task.
pub type ResponseChannel = Channel<CriticalSectionRawMutex, Response, 2>;

/// Bulk packet size of the console endpoints.
pub const PACKET_SIZE: u16 = 64;

/// Result of feeding bytes into a [`LineReader`].
enum Line<'a> {
    Complete(&'a [u8]),
    Overflow,
}

/// Accumulates bytes into lines, discarding lines that do not fit.
struct LineReader {
    buffer: Vec<u8, MAX_COMMAND_LENGTH>,
    discarding: bool,
}

impl LineReader {
    const fn new() -> Self {
        Self {
            buffer: Vec::new(),
            discarding: false,
        }
    }

    fn clear(&mut self) {
        self.buffer.clear();
        self.discarding = false;
    }

    /// Feed one byte. Returns a line when `byte` terminates one.
    fn push(&mut self, byte: u8) -> Option<Line<'_>> {
        if byte == b'\n' {
            if self.discarding {
                self.discarding = false;
                self.buffer.clear();
                return Some(Line::Overflow);
            }
            return Some(Line::Complete(&self.buffer));
        }
        if self.discarding {
            return None;
        }
        if self.buffer.push(byte).is_err() {
            // Too long: drop everything up to the next newline
            self.discarding = true;
        }
        None
    }
}

/// Serve the console until the host closes the port.
pub async fn serve(
    class: &mut ConsoleClass,
    commands: &CommandChannel,
    responses: &ResponseChannel,
) -> Result<(), EndpointError> {
    let mut reader = LineReader::new();
    let mut packet = [0u8; PACKET_SIZE as usize];

    loop {
        let len = class.read_packet(&mut packet).await?;
        for &byte in &packet[..len] {
            let response = match reader.push(byte) {
                None => continue,
                Some(Line::Overflow) => {
                    defmt::warn!("Console line too long");
                    Response::Error(ResponseError::Unknown)
                }
                Some(Line::Complete(line)) => match parse_command(line) {
                    Ok(command) => {
                        defmt::debug!("Console command: {}", command);
                        commands.send(command).await;
                        responses.receive().await
                    }
                    Err(err) => {
                        defmt::debug!("Console parse error: {}", err);
                        Response::Error(err.into())
                    }
                },
            };
            reader.clear();
            write_response(class, &response).await?;
        }
    }
}

async fn write_response(class: &mut ConsoleClass, response: &Response) -> Result<(), EndpointError> {
    let out = match response.serialize_to_vec::<MAX_RESPONSE_SIZE>() {
        Ok(out) => out,
        Err(err) => {
            defmt::error!("Response does not fit: {}", err);
            return Ok(());
        }
    };

    for chunk in out.chunks(PACKET_SIZE as usize) {
        class.write_packet(chunk).await?;
    }
    // A full last packet needs a zero-length packet to end the transfer
    if out.len() % PACKET_SIZE as usize == 0 {
        class.write_packet(&[]).await?;
    }
    Ok(())
}
